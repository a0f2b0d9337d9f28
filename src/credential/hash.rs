//! Stable addressing of credentials.

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a credential, hex encoded.
///
/// Every counter operation for a credential is routed by this value, and
/// counter stores only ever see the hash, never the raw secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialHash(String);

impl CredentialHash {
    /// Hash a raw credential.
    pub fn of(credential: &str) -> Self {
        let hash = Sha256::digest(credential.as_bytes());
        Self(hex::encode(hash))
    }

    /// Full 64-character hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
