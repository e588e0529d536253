use serde::{Deserialize, Serialize};
use std::fmt;
use super::aggregator::AggregationState;

/// A connection strictly above this many packets is reported as a flood.
pub const DDOS_PACKET_THRESHOLD: u64 = 100;
/// A source strictly above this many distinct destinations is reported as a scan.
pub const SCAN_DESTINATION_THRESHOLD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatKind {
    #[serde(rename = "Potential DDoS")]
    PotentialDdos,
    #[serde(rename = "Potential Port Scan")]
    PotentialPortScan,
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreatKind::PotentialDdos => write!(f, "Potential DDoS"),
            ThreatKind::PotentialPortScan => write!(f, "Potential Port Scan"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreatFinding {
    #[serde(rename = "type")]
    pub kind: ThreatKind,
    pub description: String,
    /// Connection key or source address the finding refers to.
    pub subject: String,
    /// Packet count or distinct destination count behind the finding.
    pub observed: u64,
}

/// Applies the flood and scan rules to a fully drained aggregation.
pub fn classify(state: &AggregationState) -> Vec<ThreatFinding> {
    let mut findings = Vec::new();

    for (key, count) in state.connections() {
        if count > DDOS_PACKET_THRESHOLD {
            findings.push(ThreatFinding {
                kind: ThreatKind::PotentialDdos,
                description: format!("High traffic volume on {}: {} packets", key, count),
                subject: key.to_string(),
                observed: count,
            });
        }
    }

    for (source, destinations) in state.sources() {
        let distinct = destinations.len();
        if distinct > SCAN_DESTINATION_THRESHOLD {
            findings.push(ThreatFinding {
                kind: ThreatKind::PotentialPortScan,
                description: format!("Host {} contacted {} distinct destinations", source, distinct),
                subject: source.to_string(),
                observed: distinct as u64,
            });
        }
    }

    findings
}
