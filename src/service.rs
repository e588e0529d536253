//! Caller-side wiring around the analysis core: upload retention, deferred
//! deletion, report persistence and feedback. Every collaborator is optional
//! and none of their failures keeps a result from reaching the caller.

use log::{debug, info, warn};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use crate::analysis::{analyze, AnalysisResult, ParallelAnalyzer};
use crate::config::Config;
use crate::storage::{
    schedule_deletion, BlobStore, Feedback, FeedbackSink, FsBlobStore, JsonReportStore,
    JsonlFeedbackSink, MemoryBlobStore, MemoryReportStore, NewReport, ReportStore, ReportType,
};
use crate::{Result, ThreatScanError};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub user_id: Option<String>,
    pub report_name: Option<String>,
    pub report_type: ReportType,
    /// Keep the raw upload until the retention window has passed.
    pub retain: bool,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            user_id: None,
            report_name: None,
            report_type: ReportType::Json,
            retain: true,
        }
    }
}

pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub report_id: Option<String>,
    pub blob_id: Option<String>,
    /// Pending deletion of the retained upload.
    pub cleanup: Option<JoinHandle<()>>,
}

pub struct AnalysisService {
    reports: Option<Arc<dyn ReportStore>>,
    feedback: Option<Arc<dyn FeedbackSink>>,
    blobs: Option<Arc<dyn BlobStore>>,
    retention: Duration,
    workers: usize,
    channel_capacity: usize,
}

impl Default for AnalysisService {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisService {
    /// Service with no collaborators attached.
    pub fn new() -> Self {
        let defaults = Config::default();
        Self {
            reports: None,
            feedback: None,
            blobs: None,
            retention: defaults.storage.blob_retention(),
            workers: defaults.analysis.workers,
            channel_capacity: defaults.analysis.channel_capacity,
        }
    }

    /// Filesystem collaborators where directories are configured, in-memory ones otherwise.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = &config.storage;

        let reports: Arc<dyn ReportStore> = match &storage.reports_dir {
            Some(dir) => Arc::new(JsonReportStore::new(dir)?),
            None => Arc::new(MemoryReportStore::new()),
        };
        let blobs: Arc<dyn BlobStore> = match &storage.blobs_dir {
            Some(dir) => Arc::new(FsBlobStore::new(dir)?),
            None => Arc::new(MemoryBlobStore::new()),
        };

        let mut service = Self::new()
            .with_reports(reports)
            .with_blobs(blobs)
            .with_retention(storage.blob_retention())
            .with_workers(config.analysis.workers, config.analysis.channel_capacity);
        if let Some(path) = &storage.feedback_file {
            service = service.with_feedback(Arc::new(JsonlFeedbackSink::new(path)?));
        }
        Ok(service)
    }

    pub fn with_reports(mut self, reports: Arc<dyn ReportStore>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_workers(mut self, workers: usize, channel_capacity: usize) -> Self {
        self.workers = workers;
        self.channel_capacity = channel_capacity;
        self
    }

    pub fn reports(&self) -> Option<&Arc<dyn ReportStore>> {
        self.reports.as_ref()
    }

    /// Analyzes an uploaded capture. Unless the request opts out, the upload is
    /// retained and scheduled for deletion whether or not the analysis succeeds.
    pub async fn analyze_upload(&self, bytes: Vec<u8>, request: UploadRequest) -> Result<AnalysisOutcome> {
        info!("Analyzing upload {} ({} bytes)", request.file_name, bytes.len());

        let blob_id = if request.retain {
            self.retain(&bytes)
        } else {
            None
        };

        let workers = self.workers;
        let channel_capacity = self.channel_capacity;
        let analysis = tokio::task::spawn_blocking(move || {
            if workers > 1 {
                ParallelAnalyzer::new(workers, channel_capacity).run(Cursor::new(bytes))
            } else {
                analyze(Cursor::new(bytes))
            }
        })
        .await
        .map_err(|e| ThreatScanError::Task(e.to_string()))?;

        let cleanup = match (&self.blobs, &blob_id) {
            (Some(blobs), Some(id)) => Some(schedule_deletion(blobs.clone(), id.clone(), self.retention)),
            _ => None,
        };

        let result = analysis?;
        let report_id = self.persist(&request, &result);

        Ok(AnalysisOutcome {
            result,
            report_id,
            blob_id,
            cleanup,
        })
    }

    /// Forwards feedback to the sink, if one is attached.
    pub async fn submit_feedback(&self, feedback: Feedback) -> Result<()> {
        match &self.feedback {
            Some(sink) => {
                let sink = sink.clone();
                tokio::task::spawn_blocking(move || sink.submit(feedback))
                    .await
                    .map_err(|e| ThreatScanError::Task(e.to_string()))?
            }
            None => {
                warn!("No feedback sink configured; dropping feedback from {}", feedback.email);
                Ok(())
            }
        }
    }

    fn retain(&self, bytes: &[u8]) -> Option<String> {
        let blobs = self.blobs.as_ref()?;
        match blobs.put(bytes) {
            Ok(id) => {
                debug!("Retained upload as blob {}", id);
                Some(id)
            }
            Err(e) => {
                warn!("Failed to retain upload: {}", e);
                None
            }
        }
    }

    fn persist(&self, request: &UploadRequest, result: &AnalysisResult) -> Option<String> {
        let reports = self.reports.as_ref()?;
        let user_id = match &request.user_id {
            Some(user_id) => user_id.clone(),
            None => {
                debug!("No user attached to upload {}; report not saved", request.file_name);
                return None;
            }
        };

        let report = NewReport {
            report_name: request
                .report_name
                .clone()
                .unwrap_or_else(|| format!("Analysis of {}", request.file_name)),
            report_type: request.report_type,
            data: result.clone(),
            user_id,
        };
        match reports.save(report) {
            Ok(id) => {
                info!("Saved report {}", id);
                Some(id)
            }
            Err(e) => {
                warn!("Failed to save report for {}: {}", request.file_name, e);
                None
            }
        }
    }
}
