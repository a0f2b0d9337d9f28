//! In-process counter store.

use crate::store::CounterStore;
use crate::KeygateError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Counter store backed by a `DashMap`.
///
/// State lives as long as the process. Suitable for single-node deployments
/// and tests.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    values: DashMap<String, String>,
}

impl MemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KeygateError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), KeygateError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}
