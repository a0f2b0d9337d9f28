//! In-process key source.

use crate::keysource::{Jwk, KeySource};
use crate::KeygateError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Key source backed by a `DashMap` of application id to keys.
#[derive(Debug, Default)]
pub struct MemoryKeySource {
    keys: DashMap<String, Vec<Jwk>>,
}

impl MemoryKeySource {
    /// Create an empty key source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the keys of `application_id`.
    pub fn insert(&self, application_id: impl Into<String>, keys: Vec<Jwk>) {
        self.keys.insert(application_id.into(), keys);
    }
}

#[async_trait]
impl KeySource for MemoryKeySource {
    async fn verification_keys(
        &self,
        application_id: &str,
    ) -> Result<Option<Vec<Jwk>>, KeygateError> {
        Ok(self.keys.get(application_id).map(|keys| keys.value().clone()))
    }
}
