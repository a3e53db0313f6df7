//! JSON-file backed memory store.
//!
//! Reads a JSON array of [`MemoryRecord`]s from disk on every call, so edits
//! made upstream between agent turns are picked up without reloading.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ServiceError;
use crate::record::MemoryRecord;
use crate::service_traits::{MemoryStore, ServiceResult};

/// Read-only store over a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ServiceResult<Vec<MemoryRecord>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ServiceError::store(format!("failed to read {}: {e}", self.path.display()))
        })?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<MemoryRecord> = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), count = records.len(), "Loaded memory records");
        Ok(records)
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn get_messages(&self) -> ServiceResult<Vec<MemoryRecord>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.is_message())
            .collect())
    }

    async fn get_all(&self) -> ServiceResult<Vec<MemoryRecord>> {
        self.load().await
    }
}
