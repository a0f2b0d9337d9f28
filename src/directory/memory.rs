//! In-process credential directory.

use crate::directory::{CredentialDirectory, CredentialRecord};
use crate::KeygateError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Credential directory backed by a `DashMap`, keyed by raw credential.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    records: DashMap<String, CredentialRecord>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `credential`.
    pub fn insert(&self, credential: impl Into<String>, record: CredentialRecord) {
        self.records.insert(credential.into(), record);
    }

    /// Remove the record for `credential`.
    pub fn remove(&self, credential: &str) -> Option<CredentialRecord> {
        self.records.remove(credential).map(|(_, record)| record)
    }

    /// Snapshot of the record for `credential`.
    pub fn get(&self, credential: &str) -> Option<CredentialRecord> {
        self.records.get(credential).map(|r| r.value().clone())
    }
}

#[async_trait]
impl CredentialDirectory for MemoryDirectory {
    async fn lookup(&self, credential: &str) -> Result<Option<CredentialRecord>, KeygateError> {
        Ok(self.get(credential))
    }

    async fn disable(&self, credential: &str) -> Result<(), KeygateError> {
        if let Some(mut record) = self.records.get_mut(credential) {
            record.metadata.active = false;
        }
        Ok(())
    }
}
