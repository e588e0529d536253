use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use uuid::Uuid;
use crate::analysis::AnalysisResult;
use crate::utils::generate_id;
use crate::{Result, ThreatScanError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportType {
    Pdf,
    Json,
    Csv,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::Pdf => write!(f, "PDF"),
            ReportType::Json => write!(f, "JSON"),
            ReportType::Csv => write!(f, "CSV"),
        }
    }
}

impl FromStr for ReportType {
    type Err = ThreatScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PDF" => Ok(ReportType::Pdf),
            "JSON" => Ok(ReportType::Json),
            "CSV" => Ok(ReportType::Csv),
            _ => Err(ThreatScanError::Parse(format!("Invalid report type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub report_name: String,
    pub report_type: ReportType,
    pub data: AnalysisResult,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: String,
    pub report_name: String,
    pub report_type: ReportType,
    pub data: AnalysisResult,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl ReportRecord {
    fn from_new(report: NewReport) -> Self {
        Self {
            id: generate_id(),
            report_name: report.report_name,
            report_type: report.report_type,
            data: report.data,
            user_id: report.user_id,
            created_at: Utc::now(),
        }
    }
}

pub trait ReportStore: Send + Sync {
    fn save(&self, report: NewReport) -> Result<String>;

    fn get(&self, id: &str) -> Result<Option<ReportRecord>>;

    /// Reports owned by `user_id`, newest first.
    fn list_by_user(&self, user_id: &str) -> Result<Vec<ReportRecord>>;

    fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryReportStore {
    records: Mutex<Vec<ReportRecord>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, Vec<ReportRecord>>> {
        self.records
            .lock()
            .map_err(|_| ThreatScanError::Storage("report store lock poisoned".to_string()))
    }
}

impl ReportStore for MemoryReportStore {
    fn save(&self, report: NewReport) -> Result<String> {
        let record = ReportRecord::from_new(report);
        let id = record.id.clone();
        self.records()?.push(record);
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<ReportRecord>> {
        Ok(self.records()?.iter().find(|r| r.id == id).cloned())
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<ReportRecord>> {
        let mut reports: Vec<ReportRecord> = self
            .records()?
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps later inserts first when timestamps tie.
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }
}

/// One pretty-printed JSON document per report under a directory.
#[derive(Debug, Clone)]
pub struct JsonReportStore {
    dir: PathBuf,
}

impl JsonReportStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        // Ids are UUIDs; anything else cannot name a stored report.
        Uuid::parse_str(id).ok()?;
        Some(self.dir.join(format!("{}.json", id)))
    }

    fn load(path: &Path) -> Result<ReportRecord> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl ReportStore for JsonReportStore {
    fn save(&self, report: NewReport) -> Result<String> {
        let record = ReportRecord::from_new(report);
        let path = self
            .path_for(&record.id)
            .ok_or_else(|| ThreatScanError::Storage(format!("Invalid report id {}", record.id)))?;
        std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        log::debug!("Saved report {} to {}", record.id, path.display());
        Ok(record.id)
    }

    fn get(&self, id: &str) -> Result<Option<ReportRecord>> {
        match self.path_for(id) {
            Some(path) if path.exists() => Ok(Some(Self::load(&path)?)),
            _ => Ok(None),
        }
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<ReportRecord>> {
        let mut reports = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load(&path) {
                Ok(record) if record.user_id == user_id => reports.push(record),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable report {}: {}", path.display(), e),
            }
        }
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        match self.path_for(id) {
            Some(path) if path.exists() => {
                std::fs::remove_file(path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
