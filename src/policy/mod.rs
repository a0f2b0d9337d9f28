//! Access policy: per-credential limits and lifecycle checks.

pub mod access;

use serde::{Deserialize, Serialize};

/// Fixed-window rate limit configured on a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    /// Calls admitted per window.
    pub limit: u64,
    /// Window length in seconds.
    #[serde(alias = "timeWindow")]
    pub window_seconds: u64,
}
