use crate::icmp::v4::Ttl;
use std::net::IpAddr;
use std::sync::mpsc;
use std::time::{Instant, SystemTime};

/// A packet as read from the socket, not yet decoded.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RawPacket {
    pub bytes: Vec<u8>,
    pub ip_addr: IpAddr,
    pub ttl: Ttl,
    pub receive_time: Instant,
    pub receive_system_time: SystemTime,
}

pub(crate) type RawPacketSender = mpsc::SyncSender<RawPacket>;
pub(crate) type RawPacketReceiver = mpsc::Receiver<RawPacket>;

/// Rendezvous channel: the receiver blocks until the processor takes the packet.
pub(crate) fn raw_packet_channel() -> (RawPacketSender, RawPacketReceiver) {
    mpsc::sync_channel::<RawPacket>(0)
}
