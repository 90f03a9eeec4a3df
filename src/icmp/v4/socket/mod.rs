use super::Ttl;
use std::{io, net::IpAddr};

pub(crate) mod raw_socket;

#[cfg(target_os = "linux")]
const ENOBUFS: i32 = 105;
#[cfg(not(target_os = "linux"))]
const ENOBUFS: i32 = 55;

/// Packet transport used by the pinger: sends ICMPv4 messages and receives
/// them together with the sender address and the IP TTL.
///
/// `recv_from` must not block longer than a short read timeout; running out
/// of time is reported as `WouldBlock` or `TimedOut`.
pub trait TSocket: Send + Sync {
    fn send_to(&self, buf: &[u8], addr: &socket2::SockAddr) -> io::Result<usize>;

    /// Writes the ICMP message (without IP header) into `buf`.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr, Ttl)>;
}

/// The kernel ran out of buffer space; the send may succeed when retried.
pub(crate) fn is_resource_exhausted(error: &io::Error) -> bool {
    error.raw_os_error() == Some(ENOBUFS) || error.kind() == io::ErrorKind::WouldBlock
}

pub(crate) fn is_poll_timeout(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// A single packet could not be read; the socket itself is fine.
pub(crate) fn is_undecodable(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::InvalidData
}
