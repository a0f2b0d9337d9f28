//! Credential directory: the read-mostly store of issued keys.
//!
//! The directory is owned by the key management layer. Verification only
//! reads it, except for disabling a key whose quota ran out.

pub mod memory;

use crate::policy::RateLimitPolicy;
use crate::KeygateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryDirectory;

/// Who a credential belongs to. Carried into usage telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyIdentity {
    /// Key record id.
    pub key_id: String,
    /// Owning account id.
    pub account_id: String,
    /// Owning application id.
    pub application_id: String,
    /// Owning application display name.
    #[serde(default)]
    pub application_name: String,
}

/// Policy attributes consumed by verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    /// Whether the key may be used at all.
    pub active: bool,

    /// Expiry, milliseconds since the Unix epoch.
    #[serde(default)]
    pub expires_at_ms: Option<i64>,

    /// Fixed-window rate limit. `None` skips rate limiting.
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,

    /// Total uses granted at issuance. `None` skips quota enforcement.
    #[serde(default)]
    pub quota: Option<u64>,
}

/// A directory entry for one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    /// Ownership of the key.
    pub identity: KeyIdentity,
    /// Lifecycle and limit attributes.
    pub metadata: CredentialMetadata,
}

/// Lookup and write-back interface to the credential directory.
#[async_trait]
pub trait CredentialDirectory: Send + Sync {
    /// Resolve a raw credential.
    ///
    /// `Ok(None)` means no record exists for that credential.
    async fn lookup(&self, credential: &str) -> Result<Option<CredentialRecord>, KeygateError>;

    /// Mark a credential inactive.
    async fn disable(&self, credential: &str) -> Result<(), KeygateError>;
}
