use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::{Result, ThreatScanError};
use crate::utils::hex_preview;
use super::aggregator::{AggregationState, TrafficAggregator};
use super::classifier::{classify, ThreatFinding};
use super::decoder::{decode, DecodedPacket, FrameOutcome};
use super::reader::{CaptureReader, RawFrame};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Every frame read, decodable or not.
    pub total_packets: usize,
    pub packet_details: Vec<DecodedPacket>,
    pub threats: Vec<ThreatFinding>,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn skipped_frames(&self) -> usize {
        self.total_packets.saturating_sub(self.packet_details.len())
    }

    pub fn protocol_distribution(&self) -> BTreeMap<String, usize> {
        let mut distribution = BTreeMap::new();
        for packet in &self.packet_details {
            *distribution.entry(packet.protocol.to_string()).or_insert(0) += 1;
        }
        distribution
    }
}

/// Runs reader, decoder, aggregator and classifier over one capture.
///
/// The analyzer keeps what it accumulated after a failed run, so callers can
/// inspect how far the capture got even though no result is returned. A
/// successful run hands its decoded packets over to the result instead.
#[derive(Debug, Default)]
pub struct Analyzer {
    frames_seen: usize,
    packets: Vec<DecodedPacket>,
    aggregator: TrafficAggregator,
    cancel: Option<Arc<AtomicBool>>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the run before the next frame once `flag` is set.
    pub fn with_cancel_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            cancel: Some(flag),
            ..Self::default()
        }
    }

    pub fn run<R: Read>(&mut self, source: R) -> Result<AnalysisResult> {
        self.reset();

        let reader = CaptureReader::new(source).map_err(|e| {
            error!("Rejecting capture: {}", e);
            ThreatScanError::from(e)
        })?;

        for frame in reader {
            if self.is_cancelled() {
                warn!("Analysis cancelled after {} frames", self.frames_seen);
                return Err(ThreatScanError::Cancelled {
                    frames_processed: self.frames_seen,
                });
            }

            match frame {
                Ok(frame) => self.process(&frame),
                Err(e) => {
                    error!(
                        "Capture parse failed after {} frames ({} decoded): {}",
                        self.frames_seen,
                        self.packets.len(),
                        e
                    );
                    return Err(e.into());
                }
            }
        }

        let packets = std::mem::take(&mut self.packets);
        Ok(assemble(self.frames_seen, packets, self.aggregator.state()))
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    pub fn packets(&self) -> &[DecodedPacket] {
        &self.packets
    }

    pub fn aggregation(&self) -> &AggregationState {
        self.aggregator.state()
    }

    fn process(&mut self, frame: &RawFrame) {
        self.frames_seen += 1;
        match decode(frame) {
            FrameOutcome::Decoded(packet) => {
                self.aggregator.observe(&packet);
                self.packets.push(packet);
            }
            FrameOutcome::Skipped(reason) => {
                debug!("Skipping frame #{}: {} [{}]", frame.index, reason, hex_preview(&frame.data, 16));
            }
        }
    }

    fn reset(&mut self) {
        self.frames_seen = 0;
        self.packets.clear();
        self.aggregator = TrafficAggregator::new();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }
}

/// Classifies a drained aggregation and packages the result.
pub(crate) fn assemble(
    frames_seen: usize,
    packets: Vec<DecodedPacket>,
    state: &AggregationState,
) -> AnalysisResult {
    let threats = classify(state);
    for threat in &threats {
        warn!("{}: {}", threat.kind, threat.description);
    }

    info!(
        "Analyzed {} frames: {} decoded, {} skipped, {} connections, {} findings",
        frames_seen,
        packets.len(),
        frames_seen.saturating_sub(packets.len()),
        state.connection_total(),
        threats.len()
    );

    AnalysisResult {
        total_packets: frames_seen,
        packet_details: packets,
        threats,
        timestamp: Utc::now(),
    }
}

pub fn analyze<R: Read>(source: R) -> Result<AnalysisResult> {
    Analyzer::new().run(source)
}

pub fn analyze_file<P: AsRef<Path>>(path: P) -> Result<AnalysisResult> {
    let file = File::open(path.as_ref())?;
    info!("Analyzing capture file {}", path.as_ref().display());
    analyze(BufReader::new(file))
}
