//! Multi-threaded variant of the orchestrator.
//!
//! The calling thread reads frames, a pool of workers decodes them, and a
//! single consumer owns the aggregation. Results match [`super::analyze`]
//! for the same input.

use crossbeam_channel::bounded;
use log::{debug, error, warn};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use crate::{Result, ThreatScanError};
use crate::utils::hex_preview;
use super::aggregator::TrafficAggregator;
use super::decoder::{decode, DecodedPacket, FrameOutcome};
use super::orchestrator::{assemble, AnalysisResult};
use super::reader::{CaptureReader, RawFrame};

pub struct ParallelAnalyzer {
    workers: usize,
    channel_capacity: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl ParallelAnalyzer {
    pub fn new(workers: usize, channel_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            channel_capacity: channel_capacity.max(1),
            cancel: None,
        }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run<R: Read>(&self, source: R) -> Result<AnalysisResult> {
        let reader = CaptureReader::new(source).map_err(|e| {
            error!("Rejecting capture: {}", e);
            ThreatScanError::from(e)
        })?;

        let (frame_tx, frame_rx) = bounded::<RawFrame>(self.channel_capacity);
        let (packet_tx, packet_rx) = bounded::<(usize, DecodedPacket)>(self.channel_capacity);

        let (frames_seen, stop, aggregator, mut packets) = thread::scope(|scope| {
            for _ in 0..self.workers {
                let frames = frame_rx.clone();
                let decoded = packet_tx.clone();
                scope.spawn(move || {
                    for frame in frames.iter() {
                        match decode(&frame) {
                            FrameOutcome::Decoded(packet) => {
                                if decoded.send((frame.index, packet)).is_err() {
                                    break;
                                }
                            }
                            FrameOutcome::Skipped(reason) => {
                                debug!("Skipping frame #{}: {} [{}]", frame.index, reason, hex_preview(&frame.data, 16));
                            }
                        }
                    }
                });
            }
            drop(frame_rx);
            drop(packet_tx);

            let consumer = scope.spawn(move || {
                let mut aggregator = TrafficAggregator::new();
                let mut packets = Vec::new();
                for (index, packet) in packet_rx.iter() {
                    aggregator.observe(&packet);
                    packets.push((index, packet));
                }
                (aggregator, packets)
            });

            let mut frames_seen = 0;
            let mut stop = None;
            for frame in reader {
                if self.is_cancelled() {
                    stop = Some(ThreatScanError::Cancelled { frames_processed: frames_seen });
                    break;
                }
                match frame {
                    Ok(frame) => {
                        frames_seen += 1;
                        if frame_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        stop = Some(ThreatScanError::from(e));
                        break;
                    }
                }
            }
            drop(frame_tx);

            let (aggregator, packets) = match consumer.join() {
                Ok(output) => output,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (frames_seen, stop, aggregator, packets)
        });

        if let Some(e) = stop {
            match &e {
                ThreatScanError::Cancelled { .. } => warn!("Analysis cancelled after {} frames", frames_seen),
                _ => error!(
                    "Capture parse failed after {} frames ({} decoded): {}",
                    frames_seen,
                    packets.len(),
                    e
                ),
            }
            return Err(e);
        }

        packets.sort_unstable_by_key(|(index, _)| *index);
        let packets = packets.into_iter().map(|(_, packet)| packet).collect();
        Ok(assemble(frames_seen, packets, aggregator.state()))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }
}
