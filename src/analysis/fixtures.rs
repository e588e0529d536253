//! In-memory libpcap captures for tests.

use std::net::Ipv4Addr;

pub const IPV4_FRAME_LEN: usize = 60;
pub const FIXTURE_TS_SEC: u32 = 1_700_000_000;

pub fn pcap_header() -> Vec<u8> {
    let mut bytes = Vec::with_capacity(24);
    bytes.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&4u16.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&65535u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes
}

pub fn pcap_header_be_nanos() -> Vec<u8> {
    let mut bytes = Vec::with_capacity(24);
    bytes.extend_from_slice(&0xa1b23c4du32.to_be_bytes());
    bytes.extend_from_slice(&2u16.to_be_bytes());
    bytes.extend_from_slice(&4u16.to_be_bytes());
    bytes.extend_from_slice(&0i32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&262144u32.to_be_bytes());
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes
}

pub fn record(frame: &[u8]) -> Vec<u8> {
    let len = frame.len() as u32;
    let mut bytes = Vec::with_capacity(16 + frame.len());
    bytes.extend_from_slice(&FIXTURE_TS_SEC.to_le_bytes());
    bytes.extend_from_slice(&250u32.to_le_bytes());
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(frame);
    bytes
}

pub fn record_be(frame: &[u8], ts_sec: u32, ts_frac: u32) -> Vec<u8> {
    let len = frame.len() as u32;
    let mut bytes = Vec::with_capacity(16 + frame.len());
    bytes.extend_from_slice(&ts_sec.to_be_bytes());
    bytes.extend_from_slice(&ts_frac.to_be_bytes());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(frame);
    bytes
}

pub fn capture(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = pcap_header();
    for frame in frames {
        bytes.extend(record(frame));
    }
    bytes
}

/// Minimum-size Ethernet II frame carrying a 20-byte IPv4 header.
pub fn ipv4_frame(source: [u8; 4], destination: [u8; 4], protocol: u8) -> Vec<u8> {
    let mut frame = ethernet_frame(0x0800, IPV4_FRAME_LEN);
    frame[14] = 0x45;
    frame[16..18].copy_from_slice(&46u16.to_be_bytes());
    frame[22] = 64;
    frame[23] = protocol;
    frame[26..30].copy_from_slice(&source);
    frame[30..34].copy_from_slice(&destination);
    frame
}

pub fn ethernet_frame(ethertype: u16, len: usize) -> Vec<u8> {
    let mut frame = vec![0u8; len.max(14)];
    frame[..6].copy_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
    frame[6..12].copy_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    frame[12..14].copy_from_slice(&ethertype.to_be_bytes());
    frame
}

pub fn short_frame(len: usize) -> Vec<u8> {
    vec![0xffu8; len]
}

/// `count` identical frames between two hosts.
pub fn flood(source: [u8; 4], destination: [u8; 4], count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| ipv4_frame(source, destination, 6)).collect()
}

/// One packet from `source` to each of `count` distinct hosts in 10.1.0.0/16.
pub fn sweep(source: [u8; 4], count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| ipv4_frame(source, [10, 1, (i / 256) as u8, (i % 256) as u8], 6))
        .collect()
}

pub fn ip(octets: [u8; 4]) -> Ipv4Addr {
    Ipv4Addr::from(octets)
}
