use crate::{AddressFamily, PingError, PingResult, SequenceNumber};
use pnet_packet::icmp::{
    echo_reply::EchoReplyPacket,
    echo_request::{EchoRequestPacket as EchoRequestPacketV4, MutableEchoRequestPacket as MutableEchoRequestPacketV4},
    IcmpCode, IcmpPacket, IcmpTypes,
};
use pnet_packet::icmpv6::{Icmpv6Code, Icmpv6Packet, Icmpv6Types, MutableIcmpv6Packet};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::Packet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) const TIMESTAMP_SIZE: usize = 8;

// type, code, checksum and the four type specific bytes (identifier and sequence number for echo
// messages, unused for time exceeded).
const ICMP_HEADER_SIZE: usize = 8;
const IPV6_HEADER_SIZE: usize = 40;
// Offset of the identifier within an echo header.
const ECHO_IDENTIFIER_OFFSET: usize = 4;

/// An inbound ICMP message, classified.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum IcmpMessage {
    EchoReply { identifier: u16, sequence_number: SequenceNumber, payload: Vec<u8> },
    /// Identifier of the echo request embedded in the expired datagram.
    TimeExceeded { original_identifier: u16 },
    Other { icmp_type: u8, icmp_code: u8 },
}

pub(crate) fn new_echo_request(
    family: AddressFamily,
    identifier: u16,
    sequence_number: SequenceNumber,
    send_time: SystemTime,
) -> Option<Vec<u8>> {
    let payload = encode_timestamp(send_time);
    match family {
        AddressFamily::V4 => new_icmpv4_echo_request(identifier, sequence_number, &payload),
        AddressFamily::V6 => new_icmpv6_echo_request(identifier, sequence_number, &payload),
    }
}

fn new_icmpv4_echo_request(identifier: u16, sequence_number: SequenceNumber, payload: &[u8]) -> Option<Vec<u8>> {
    let buf = vec![0u8; EchoRequestPacketV4::minimum_packet_size() + payload.len()];
    let mut package = MutableEchoRequestPacketV4::owned(buf)?;
    package.set_icmp_type(IcmpTypes::EchoRequest);
    package.set_icmp_code(IcmpCode::new(0));
    package.set_identifier(identifier);
    package.set_sequence_number(sequence_number.into());
    package.set_payload(payload);

    package.set_checksum(0_u16);
    let checksum = pnet_packet::icmp::checksum(&IcmpPacket::new(package.packet())?);
    package.set_checksum(checksum);
    Some(package.packet().to_vec())
}

// The kernel fills in the ICMPv6 checksum since it depends on the source address.
fn new_icmpv6_echo_request(identifier: u16, sequence_number: SequenceNumber, payload: &[u8]) -> Option<Vec<u8>> {
    let mut echo_body = Vec::with_capacity(4 + payload.len());
    echo_body.extend_from_slice(&identifier.to_be_bytes());
    echo_body.extend_from_slice(&u16::from(sequence_number).to_be_bytes());
    echo_body.extend_from_slice(payload);

    let buf = vec![0u8; Icmpv6Packet::minimum_packet_size() + echo_body.len()];
    let mut package = MutableIcmpv6Packet::owned(buf)?;
    package.set_icmpv6_type(Icmpv6Types::EchoRequest);
    package.set_icmpv6_code(Icmpv6Code::new(0));
    package.set_checksum(0_u16);
    package.set_payload(&echo_body);
    Some(package.packet().to_vec())
}

/// Parses the ICMP message of a received datagram. `bytes` starts at the ICMP header.
pub(crate) fn decode(family: AddressFamily, bytes: &[u8]) -> PingResult<IcmpMessage> {
    match family {
        AddressFamily::V4 => decode_icmpv4(bytes),
        AddressFamily::V6 => decode_icmpv6(bytes),
    }
}

fn decode_icmpv4(bytes: &[u8]) -> PingResult<IcmpMessage> {
    let icmp_packet = IcmpPacket::new(bytes).ok_or_else(|| too_short(bytes, "ICMP"))?;
    match icmp_packet.get_icmp_type() {
        IcmpTypes::EchoReply => {
            let echo_reply = EchoReplyPacket::new(bytes).ok_or_else(|| too_short(bytes, "echo reply"))?;
            Ok(IcmpMessage::EchoReply {
                identifier: echo_reply.get_identifier(),
                sequence_number: echo_reply.get_sequence_number().into(),
                payload: echo_reply.payload().to_vec(),
            })
        }
        IcmpTypes::TimeExceeded => {
            let original_datagram = bytes.get(ICMP_HEADER_SIZE..).ok_or_else(|| too_short(bytes, "time exceeded"))?;
            let original_ip =
                Ipv4Packet::new(original_datagram).ok_or_else(|| too_short(original_datagram, "embedded IPv4"))?;
            let ip_header_size = usize::from(original_ip.get_header_length()) * 4;
            let original_identifier = echo_identifier_at(original_datagram, ip_header_size)?;
            Ok(IcmpMessage::TimeExceeded { original_identifier })
        }
        other => Ok(IcmpMessage::Other { icmp_type: other.0, icmp_code: icmp_packet.get_icmp_code().0 }),
    }
}

fn decode_icmpv6(bytes: &[u8]) -> PingResult<IcmpMessage> {
    let icmp_packet = Icmpv6Packet::new(bytes).ok_or_else(|| too_short(bytes, "ICMPv6"))?;
    match icmp_packet.get_icmpv6_type() {
        Icmpv6Types::EchoReply => {
            let echo_body = icmp_packet.payload();
            if echo_body.len() < 4 {
                return Err(too_short(bytes, "echo reply"));
            }
            Ok(IcmpMessage::EchoReply {
                identifier: u16::from_be_bytes([echo_body[0], echo_body[1]]),
                sequence_number: u16::from_be_bytes([echo_body[2], echo_body[3]]).into(),
                payload: echo_body[4..].to_vec(),
            })
        }
        Icmpv6Types::TimeExceeded => {
            let original_datagram = bytes.get(ICMP_HEADER_SIZE..).ok_or_else(|| too_short(bytes, "time exceeded"))?;
            let original_identifier = echo_identifier_at(original_datagram, IPV6_HEADER_SIZE)?;
            Ok(IcmpMessage::TimeExceeded { original_identifier })
        }
        other => Ok(IcmpMessage::Other { icmp_type: other.0, icmp_code: icmp_packet.get_icmpv6_code().0 }),
    }
}

// `ip_header_size` is where the ICMP header of the expired echo request starts.
fn echo_identifier_at(original_datagram: &[u8], ip_header_size: usize) -> PingResult<u16> {
    let start = ip_header_size + ECHO_IDENTIFIER_OFFSET;
    match original_datagram.get(start..start + 2) {
        Some(&[high, low]) => Ok(u16::from_be_bytes([high, low])),
        _ => Err(too_short(original_datagram, "embedded echo request")),
    }
}

fn too_short(bytes: &[u8], what: &str) -> PingError {
    PingError::Decode(format!("{} bytes are too short for a {what} header", bytes.len()))
}

pub(crate) fn encode_timestamp(time: SystemTime) -> [u8; TIMESTAMP_SIZE] {
    let nanos = time.duration_since(UNIX_EPOCH).map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
    nanos.to_be_bytes()
}

pub(crate) fn decode_timestamp(payload: &[u8]) -> PingResult<SystemTime> {
    let bytes: [u8; TIMESTAMP_SIZE] = payload
        .get(..TIMESTAMP_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| PingError::Decode(format!("echo payload of {} bytes carries no timestamp", payload.len())))?;
    Ok(UNIX_EPOCH + Duration::from_nanos(u64::from_be_bytes(bytes)))
}
