use super::TSocket;
use crate::icmp::v4::Ttl;
use pnet_packet::ipv4::Ipv4Packet;
use socket2::{Domain, Protocol, SockAddr, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

const RECEIVE_BUFFER_SIZE: usize = 512;

/// A raw ICMPv4 socket. Needs root privileges or `CAP_NET_RAW`.
pub struct RawSocket {
    socket: socket2::Socket,
}

impl RawSocket {
    pub fn bind(listen_address: Ipv4Addr, ttl: Ttl, read_timeout: Duration) -> io::Result<RawSocket> {
        tracing::trace!("creating raw ICMPv4 socket on {listen_address}");
        let socket = socket2::Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        socket.bind(&SockAddr::from(SocketAddr::new(IpAddr::V4(listen_address), 0)))?;
        socket.set_ttl(u32::from(ttl.0))?;
        socket.set_read_timeout(Some(read_timeout))?;
        Ok(RawSocket { socket })
    }
}

impl TSocket for RawSocket {
    fn send_to(&self, buf: &[u8], addr: &SockAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr, Ttl)> {
        let mut recv_buf = [0u8; RECEIVE_BUFFER_SIZE];

        // Socket2 gives a safety guaranty which allows us to do an unsafe cast from `&mut [u8]`
        // to `&mut [std::mem::MaybeUninit<u8>]`.
        // https://docs.rs/socket2/0.4.7/socket2/struct.Socket.html#method.recv
        //
        // On a RAW socket we get an IP packet.
        let (n, socket_addr) = self.socket.recv_from(unsafe {
            &mut *(std::ptr::addr_of_mut!(recv_buf) as *mut [u8] as *mut [std::mem::MaybeUninit<u8>])
        })?;

        let received = &recv_buf[..n];
        let ipv4_packet = Ipv4Packet::new(received)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "truncated IPv4 header"))?;
        let header_len = usize::from(ipv4_packet.get_header_length()) * 4;
        let icmp = received
            .get(header_len..)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "IPv4 header length exceeds packet"))?;
        // Return only the ICMP content
        let len = icmp.len().min(buf.len());
        buf[..len].copy_from_slice(&icmp[..len]);

        let ip = socket_addr
            .as_socket_ipv4()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "sender is not an IPv4 address"))?;
        Ok((len, IpAddr::V4(*ip.ip()), ipv4_packet.get_ttl().into()))
    }
}
