//! Verification verdicts.

use crate::policy::RateLimitPolicy;
use serde::Serialize;
use std::fmt;

/// Why a credential was rejected.
///
/// `NotFound` covers both an unknown credential and a credential presented
/// for the wrong application, so callers cannot discover existing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Unknown credential or application mismatch.
    NotFound,
    /// The key is disabled.
    Disabled,
    /// The key is past its expiry.
    Expired,
    /// The current rate-limit window is used up.
    RateLimited,
    /// The usage quota is used up.
    QuotaExceeded,
    /// The signed token failed verification.
    InvalidSignature,
}

impl RejectReason {
    /// Machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NotFound => "not_found",
            RejectReason::Disabled => "disabled",
            RejectReason::Expired => "expired",
            RejectReason::RateLimited => "rate_limited",
            RejectReason::QuotaExceeded => "quota_exceeded",
            RejectReason::InvalidSignature => "invalid_signature",
        }
    }

    /// HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            RejectReason::NotFound => 401,
            RejectReason::Disabled | RejectReason::Expired | RejectReason::InvalidSignature => 403,
            RejectReason::RateLimited | RejectReason::QuotaExceeded => 429,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Rate-limit state reported with an accepted verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    /// Calls admitted per window.
    pub limit: u64,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Calls left in the current window.
    pub remaining: u64,
}

impl RateLimitStatus {
    pub(crate) fn new(policy: RateLimitPolicy, remaining: u64) -> Self {
        Self {
            limit: policy.limit,
            window_seconds: policy.window_seconds,
            remaining,
        }
    }
}

/// Details of an accepted credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    /// Rate-limit budget, when the key is rate limited.
    pub rate_limit: Option<RateLimitStatus>,
    /// Quota left, when the key has a quota.
    pub quota_remaining: Option<u64>,
    /// Whether the key is still enabled after this call.
    /// False when this call used the last unit of quota.
    pub enabled: bool,
}

impl Acceptance {
    /// Remaining rate-limit budget, if rate limited.
    pub fn rate_limit_remaining(&self) -> Option<u64> {
        self.rate_limit.map(|status| status.remaining)
    }
}

/// Details of a rejected credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// Why the credential was rejected.
    pub reason: RejectReason,
    /// Budget left for limit rejections (always 0), `None` otherwise.
    pub remaining: Option<u64>,
}

/// Terminal decision for one verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// The credential may be used.
    Accept(Acceptance),
    /// The credential may not be used.
    Reject(Rejection),
}

impl Verdict {
    pub(crate) fn reject(reason: RejectReason) -> Self {
        Verdict::Reject(Rejection {
            reason,
            remaining: None,
        })
    }

    pub(crate) fn exhausted(reason: RejectReason) -> Self {
        Verdict::Reject(Rejection {
            reason,
            remaining: Some(0),
        })
    }

    /// Whether the credential was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accept(_))
    }

    /// Rejection reason, if rejected.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Accept(_) => None,
            Verdict::Reject(rejection) => Some(rejection.reason),
        }
    }

    /// HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Verdict::Accept(_) => 200,
            Verdict::Reject(rejection) => rejection.reason.status_code(),
        }
    }
}
