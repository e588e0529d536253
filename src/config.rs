use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Decoder threads. 0 or 1 runs the sequential orchestrator.
    pub workers: usize,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub reports_dir: Option<String>,
    pub blobs_dir: Option<String>,
    pub feedback_file: Option<String>,
    pub blob_retention_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            analysis: AnalysisConfig {
                workers: 1,
                channel_capacity: 1024,
            },
            storage: StorageConfig {
                reports_dir: None,
                blobs_dir: None,
                feedback_file: None,
                blob_retention_secs: 300,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl StorageConfig {
    pub fn blob_retention(&self) -> Duration {
        Duration::from_secs(self.blob_retention_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.analysis.workers, 1);
        assert_eq!(config.storage.blob_retention(), Duration::from_secs(300));
        assert!(config.storage.reports_dir.is_none());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("threatscan-config-{}", crate::utils::generate_id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.analysis.workers = 4;
        config.storage.reports_dir = Some("/var/lib/threatscan/reports".to_string());
        config.to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.analysis.workers, 4);
        assert_eq!(loaded.storage.reports_dir.as_deref(), Some("/var/lib/threatscan/reports"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = std::env::temp_dir().join(format!("threatscan-config-{}", crate::utils::generate_id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::from_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, crate::ThreatScanError::Config(_)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
