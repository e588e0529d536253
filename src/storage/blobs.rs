use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;
use crate::utils::generate_id;
use crate::{Result, ThreatScanError};

/// Retention for raw uploaded captures.
pub trait BlobStore: Send + Sync {
    fn put(&self, bytes: &[u8]) -> Result<String>;

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>>;

    fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.blobs()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn blobs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| ThreatScanError::Storage("blob store lock poisoned".to_string()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, bytes: &[u8]) -> Result<String> {
        let id = generate_id();
        self.blobs()?.insert(id.clone(), bytes.to_vec());
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs()?.get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.blobs()?.remove(id).is_some())
    }
}

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        Uuid::parse_str(id).ok()?;
        Some(self.dir.join(format!("{}.pcap", id)))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, bytes: &[u8]) -> Result<String> {
        let id = generate_id();
        let path = self
            .path_for(&id)
            .ok_or_else(|| ThreatScanError::Storage(format!("Invalid blob id {}", id)))?;
        std::fs::write(path, bytes)?;
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        match self.path_for(id) {
            Some(path) if path.exists() => Ok(Some(std::fs::read(path)?)),
            _ => Ok(None),
        }
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

/// Deletes blob `id` once `delay` has elapsed. Must be called inside a tokio runtime.
pub fn schedule_deletion(store: Arc<dyn BlobStore>, id: String, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match store.delete(&id) {
            Ok(true) => log::info!("Deleted retained capture {}", id),
            Ok(false) => log::debug!("Retained capture {} already gone", id),
            Err(e) => log::warn!("Failed to delete retained capture {}: {}", id, e),
        }
    })
}
