use thiserror::Error;

/// Failures raised while walking a capture container.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Malformed capture container: {0}")]
    MalformedContainer(String),

    #[error("Truncated frame #{index}: source ended {available} bytes into the record")]
    TruncatedFrame {
        index: usize,
        available: usize,
    },

    #[error("Capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ThreatScanError {
    #[error("Analysis failed: {0}")]
    AnalysisFailed(#[from] CaptureError),

    #[error("Analysis cancelled after {frames_processed} frames")]
    Cancelled { frames_processed: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Background task error: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ThreatScanError>;
