use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::Ipv4Addr;
use super::decoder::DecodedPacket;

/// Directional source/destination pair. `a -> b` and `b -> a` are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl ConnectionKey {
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Self { source, destination }
    }
}

impl From<&DecodedPacket> for ConnectionKey {
    fn from(packet: &DecodedPacket) -> Self {
        Self::new(packet.source, packet.destination)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Per-connection packet counts and per-source destination sets for one
/// capture. Entries only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationState {
    connections: HashMap<ConnectionKey, u64>,
    destinations: HashMap<Ipv4Addr, HashSet<Ipv4Addr>>,
}

impl AggregationState {
    pub fn connection_count(&self, key: &ConnectionKey) -> u64 {
        self.connections.get(key).copied().unwrap_or(0)
    }

    pub fn distinct_destinations(&self, source: &Ipv4Addr) -> usize {
        self.destinations.get(source).map_or(0, HashSet::len)
    }

    pub fn connections(&self) -> impl Iterator<Item = (&ConnectionKey, u64)> {
        self.connections.iter().map(|(key, count)| (key, *count))
    }

    pub fn sources(&self) -> impl Iterator<Item = (&Ipv4Addr, &HashSet<Ipv4Addr>)> {
        self.destinations.iter()
    }

    pub fn connection_total(&self) -> usize {
        self.connections.len()
    }

    pub fn packet_total(&self) -> u64 {
        self.connections.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct TrafficAggregator {
    state: AggregationState,
}

impl TrafficAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, packet: &DecodedPacket) {
        *self
            .state
            .connections
            .entry(ConnectionKey::from(packet))
            .or_insert(0) += 1;
        self.state
            .destinations
            .entry(packet.source)
            .or_default()
            .insert(packet.destination);
    }

    pub fn state(&self) -> &AggregationState {
        &self.state
    }

    pub fn into_state(self) -> AggregationState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::decoder::Protocol;
    use crate::analysis::fixtures::ip;

    fn packet(source: [u8; 4], destination: [u8; 4]) -> DecodedPacket {
        DecodedPacket {
            source: ip(source),
            destination: ip(destination),
            protocol: Protocol::Tcp,
            size: 60,
        }
    }

    #[test]
    fn test_counts_per_connection() {
        let mut aggregator = TrafficAggregator::new();
        for _ in 0..3 {
            aggregator.observe(&packet([10, 0, 0, 1], [10, 0, 0, 2]));
        }
        aggregator.observe(&packet([10, 0, 0, 1], [10, 0, 0, 3]));

        let state = aggregator.state();
        let key = ConnectionKey::new(ip([10, 0, 0, 1]), ip([10, 0, 0, 2]));
        assert_eq!(state.connection_count(&key), 3);
        assert_eq!(state.connection_total(), 2);
        assert_eq!(state.packet_total(), 4);
        assert_eq!(state.distinct_destinations(&ip([10, 0, 0, 1])), 2);
    }

    #[test]
    fn test_direction_matters() {
        let mut aggregator = TrafficAggregator::new();
        aggregator.observe(&packet([10, 0, 0, 1], [10, 0, 0, 2]));
        aggregator.observe(&packet([10, 0, 0, 2], [10, 0, 0, 1]));

        let state = aggregator.into_state();
        assert_eq!(state.connection_total(), 2);
        assert_eq!(state.connection_count(&ConnectionKey::new(ip([10, 0, 0, 1]), ip([10, 0, 0, 2]))), 1);
        assert_eq!(state.connection_count(&ConnectionKey::new(ip([10, 0, 0, 2]), ip([10, 0, 0, 1]))), 1);
        assert_eq!(state.distinct_destinations(&ip([10, 0, 0, 2])), 1);
    }

    #[test]
    fn test_repeat_destination_counted_once() {
        let mut aggregator = TrafficAggregator::new();
        for _ in 0..5 {
            aggregator.observe(&packet([172, 16, 0, 9], [172, 16, 0, 1]));
        }
        assert_eq!(aggregator.state().distinct_destinations(&ip([172, 16, 0, 9])), 1);
        assert_eq!(aggregator.state().distinct_destinations(&ip([172, 16, 0, 1])), 0);
    }

    #[test]
    fn test_key_display() {
        let key = ConnectionKey::new(ip([192, 168, 0, 1]), ip([1, 1, 1, 1]));
        assert_eq!(key.to_string(), "192.168.0.1 -> 1.1.1.1");
    }

    #[test]
    fn test_empty_state() {
        let state = AggregationState::default();
        assert!(state.is_empty());
        assert_eq!(state.connection_count(&ConnectionKey::new(ip([1, 1, 1, 1]), ip([2, 2, 2, 2]))), 0);
    }
}
