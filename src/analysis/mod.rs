pub mod reader;
pub mod decoder;
pub mod aggregator;
pub mod classifier;
pub mod orchestrator;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod fixtures;

pub use reader::{CaptureReader, RawFrame};
pub use decoder::{decode, decode_packet, DecodedPacket, FrameOutcome, Protocol, SkipReason};
pub use aggregator::{AggregationState, ConnectionKey, TrafficAggregator};
pub use classifier::{classify, ThreatFinding, ThreatKind};
pub use orchestrator::{analyze, analyze_file, AnalysisResult, Analyzer};
pub use pipeline::ParallelAnalyzer;
