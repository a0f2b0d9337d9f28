//! File-based counter store with atomic writes.
//!
//! Stores one JSON file per counter under `dirs::data_dir()/<namespace>/`.
//! Uses temp file + rename for atomic writes, so a crash mid-write never
//! leaves a torn counter behind.

use crate::store::CounterStore;
use crate::KeygateError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// File-based counter store.
#[derive(Debug, Clone)]
pub struct FileCounterStore {
    /// Directory for counter files.
    dir: PathBuf,
}

impl FileCounterStore {
    /// Create a file store with the given namespace.
    ///
    /// Counter files are stored under `dirs::data_dir()/<namespace>/`.
    pub async fn new(namespace: &str) -> Result<Self, KeygateError> {
        if namespace.is_empty() {
            return Err(KeygateError::ConfigError(
                "store namespace cannot be empty".to_string(),
            ));
        }

        let base_dir = dirs::data_dir().ok_or_else(|| {
            KeygateError::StorageUnavailable("Could not find data directory".to_string())
        })?;

        Self::with_path(base_dir.join(namespace)).await
    }

    /// Create a file store rooted at a specific directory.
    pub async fn with_path(dir: PathBuf) -> Result<Self, KeygateError> {
        fs::create_dir_all(&dir).await.map_err(|e| {
            KeygateError::StorageUnavailable(format!("Failed to create store dir: {}", e))
        })?;
        Ok(Self { dir })
    }

    /// Path of the file backing `key`.
    fn counter_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(key)))
    }
}

/// Map a store key onto a portable file name.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl CounterStore for FileCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KeygateError> {
        match fs::read_to_string(self.counter_path(key)).await {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeygateError::StorageUnavailable(format!(
                "Failed to read counter file: {}",
                e
            ))),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), KeygateError> {
        let target_path = self.counter_path(key);
        let temp_path = target_path.with_extension("tmp");

        fs::write(&temp_path, value.as_bytes()).await.map_err(|e| {
            KeygateError::StorageUnavailable(format!("Failed to write temp file: {}", e))
        })?;

        fs::rename(&temp_path, &target_path).await.map_err(|e| {
            KeygateError::StorageUnavailable(format!("Failed to rename counter file: {}", e))
        })?;

        Ok(())
    }
}
