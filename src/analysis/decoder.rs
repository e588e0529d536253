use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::Packet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use crate::ThreatScanError;
use super::reader::RawFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Unknown(u8),
}

impl Protocol {
    pub fn from_number(number: u8) -> Self {
        match number {
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            1 => Protocol::Icmp,
            other => Protocol::Unknown(other),
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Icmp => 1,
            Protocol::Unknown(n) => *n,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Unknown(n) => write!(f, "Unknown({})", n),
        }
    }
}

impl FromStr for Protocol {
    type Err = ThreatScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            "ICMP" => Ok(Protocol::Icmp),
            other => other
                .strip_prefix("Unknown(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|n| n.parse::<u8>().ok())
                .map(Protocol::from_number)
                .ok_or_else(|| ThreatScanError::Parse(format!("Invalid protocol name: {}", other))),
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Fields extracted from one IPv4-over-Ethernet frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPacket {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: Protocol,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Frame ends before the ethertype field.
    TooShort { len: usize },
    NotIpv4 { ethertype: u16 },
    /// IPv4 ethertype but the frame ends inside the fixed IPv4 header.
    TruncatedIpv4 { len: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooShort { len } => write!(f, "frame too short for link header ({} bytes)", len),
            SkipReason::NotIpv4 { ethertype } => write!(f, "non-IPv4 ethertype 0x{:04x}", ethertype),
            SkipReason::TruncatedIpv4 { len } => write!(f, "IPv4 header truncated ({} bytes)", len),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Decoded(DecodedPacket),
    Skipped(SkipReason),
}

impl FrameOutcome {
    pub fn packet(self) -> Option<DecodedPacket> {
        match self {
            FrameOutcome::Decoded(packet) => Some(packet),
            FrameOutcome::Skipped(_) => None,
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, FrameOutcome::Decoded(_))
    }
}

/// Decodes one frame assuming a plain 14-byte Ethernet II header followed by
/// an IPv4 header without options. Never fails; unusable frames are skipped.
pub fn decode(frame: &RawFrame) -> FrameOutcome {
    let ethernet = match EthernetPacket::new(&frame.data) {
        Some(ethernet) => ethernet,
        None => return FrameOutcome::Skipped(SkipReason::TooShort { len: frame.data.len() }),
    };

    let ethertype = ethernet.get_ethertype();
    if ethertype != EtherTypes::Ipv4 {
        return FrameOutcome::Skipped(SkipReason::NotIpv4 { ethertype: ethertype.0 });
    }

    let ipv4 = match Ipv4Packet::new(ethernet.payload()) {
        Some(ipv4) => ipv4,
        None => return FrameOutcome::Skipped(SkipReason::TruncatedIpv4 { len: frame.data.len() }),
    };

    FrameOutcome::Decoded(DecodedPacket {
        source: ipv4.get_source(),
        destination: ipv4.get_destination(),
        protocol: Protocol::from_number(ipv4.get_next_level_protocol().0),
        size: frame.size(),
    })
}

pub fn decode_packet(frame: &RawFrame) -> Option<DecodedPacket> {
    decode(frame).packet()
}
