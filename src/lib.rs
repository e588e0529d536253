pub mod analysis;
pub mod config;
pub mod error;
pub mod service;
pub mod storage;
pub mod utils;

pub use error::{CaptureError, ThreatScanError, Result};
pub use config::Config;
pub use analysis::{analyze, AnalysisResult};
