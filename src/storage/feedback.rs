use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use crate::{Result, ThreatScanError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeedbackLine {
    #[serde(flatten)]
    feedback: Feedback,
    received_at: DateTime<Utc>,
}

/// Write-only destination for user feedback.
pub trait FeedbackSink: Send + Sync {
    fn submit(&self, feedback: Feedback) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryFeedbackSink {
    entries: Mutex<Vec<Feedback>>,
}

impl MemoryFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Feedback> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl FeedbackSink for MemoryFeedbackSink {
    fn submit(&self, feedback: Feedback) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| ThreatScanError::Storage("feedback sink lock poisoned".to_string()))?
            .push(feedback);
        Ok(())
    }
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlFeedbackSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlFeedbackSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }
}

impl FeedbackSink for JsonlFeedbackSink {
    fn submit(&self, feedback: Feedback) -> Result<()> {
        let line = serde_json::to_string(&FeedbackLine {
            feedback,
            received_at: Utc::now(),
        })?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ThreatScanError::Storage("feedback sink lock poisoned".to_string()))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
