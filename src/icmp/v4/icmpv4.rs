use super::{Identifier, SequenceNumber};
use pnet_packet::icmp::{
    checksum,
    echo_reply::EchoReplyPacket,
    echo_request::{EchoRequestPacket, MutableEchoRequestPacket},
    time_exceeded::TimeExceededPacket,
    IcmpPacket, IcmpTypes,
};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::Packet;
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub(crate) const PAYLOAD_SIZE: usize = 56;
const TIMESTAMP_SIZE: usize = 8;

/// Builds echo requests. The payload starts with the send timestamp and is
/// padded with random bytes chosen once per instance.
pub(crate) struct IcmpV4 {
    payload: [u8; PAYLOAD_SIZE],
}

impl IcmpV4 {
    pub(crate) fn new() -> IcmpV4 {
        let mut payload = [0u8; PAYLOAD_SIZE];
        rand::thread_rng().fill(&mut payload[TIMESTAMP_SIZE..]);
        IcmpV4 { payload }
    }

    pub(crate) fn new_echo_request(
        &self,
        identifier: Identifier,
        sequence_number: SequenceNumber,
        send_time: SystemTime,
    ) -> Option<MutableEchoRequestPacket<'static>> {
        let mut payload = self.payload;
        payload[..TIMESTAMP_SIZE].copy_from_slice(&encode_timestamp(send_time));

        let buf = vec![0u8; EchoRequestPacket::minimum_packet_size() + payload.len()];
        let mut package = MutableEchoRequestPacket::owned(buf)?;
        package.set_icmp_type(IcmpTypes::EchoRequest);
        package.set_identifier(identifier.into());
        package.set_sequence_number(sequence_number.into());
        package.set_payload(&payload);

        package.set_checksum(0_u16);
        let checksum = checksum(&IcmpPacket::new(package.packet())?);
        package.set_checksum(checksum);
        Some(package)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EchoHeader {
    pub identifier: Identifier,
    pub sequence_number: SequenceNumber,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EchoReply {
    pub header: EchoHeader,
    pub send_time: Option<SystemTime>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IcmpMessage {
    EchoReply(EchoReply),
    /// `None` when the quoted datagram is not one of our echo requests.
    TimeExceeded(Option<EchoHeader>),
    Other { icmp_type: u8, icmp_code: u8 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum DecodeError {
    #[error("packet too short ({0} bytes)")]
    TooShort(usize),
    #[error("bad checksum {received:#06x}, expected {computed:#06x}")]
    Checksum { received: u16, computed: u16 },
}

/// Decodes an ICMPv4 message (without IP header).
pub(crate) fn decode(buf: &[u8]) -> Result<IcmpMessage, DecodeError> {
    let icmp = IcmpPacket::new(buf).ok_or(DecodeError::TooShort(buf.len()))?;
    let computed = checksum(&icmp);
    if computed != icmp.get_checksum() {
        return Err(DecodeError::Checksum { received: icmp.get_checksum(), computed });
    }

    let icmp_type = icmp.get_icmp_type();
    if icmp_type == IcmpTypes::EchoReply {
        let reply = EchoReplyPacket::new(buf).ok_or(DecodeError::TooShort(buf.len()))?;
        Ok(IcmpMessage::EchoReply(EchoReply {
            header: EchoHeader {
                identifier: reply.get_identifier().into(),
                sequence_number: reply.get_sequence_number().into(),
            },
            send_time: decode_timestamp(reply.payload()),
        }))
    } else if icmp_type == IcmpTypes::TimeExceeded {
        let time_exceeded = TimeExceededPacket::new(buf).ok_or(DecodeError::TooShort(buf.len()))?;
        Ok(IcmpMessage::TimeExceeded(extract_echo_request(time_exceeded.payload())))
    } else {
        Ok(IcmpMessage::Other { icmp_type: icmp_type.0, icmp_code: icmp.get_icmp_code().0 })
    }
}

// The quoted datagram is the original IP header plus at least 8 bytes of its
// payload, which covers the echo header.
fn extract_echo_request(payload: &[u8]) -> Option<EchoHeader> {
    let ipv4 = Ipv4Packet::new(payload)?;
    let header_len = usize::from(ipv4.get_header_length()) * 4;
    let nested = payload.get(header_len..)?;
    let echo_request = EchoRequestPacket::new(nested)?;
    if echo_request.get_icmp_type() != IcmpTypes::EchoRequest {
        return None;
    }
    Some(EchoHeader {
        identifier: echo_request.get_identifier().into(),
        sequence_number: echo_request.get_sequence_number().into(),
    })
}

fn encode_timestamp(time: SystemTime) -> [u8; TIMESTAMP_SIZE] {
    let nanos = time
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    nanos.to_be_bytes()
}

fn decode_timestamp(payload: &[u8]) -> Option<SystemTime> {
    let bytes: [u8; TIMESTAMP_SIZE] = payload.get(..TIMESTAMP_SIZE)?.try_into().ok()?;
    match u64::from_be_bytes(bytes) {
        0 => None,
        nanos => UNIX_EPOCH.checked_add(Duration::from_nanos(nanos)),
    }
}
