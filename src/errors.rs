//! Keygate error types.

use thiserror::Error;

/// Errors that can occur while verifying a credential or operating a counter.
///
/// Policy rejections (unknown key, disabled, rate limited, ...) are not
/// errors; they are reported as a [`crate::Verdict`]. An error always means
/// the system could not reach a decision.
#[derive(Debug, Error)]
pub enum KeygateError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No credential was presented.
    #[error("No credential provided")]
    MissingCredential,

    /// The counter store could not be read or written.
    #[error("Counter storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The credential directory or the key source could not be reached.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Signed token signature verification failed.
    #[error("Token signature verification failed")]
    SignatureInvalid,

    /// A token, key or wire message could not be parsed.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The telemetry sink rejected an event.
    #[error("Telemetry sink unavailable: {0}")]
    TelemetryUnavailable(String),
}

impl KeygateError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeygateError::StorageUnavailable(_)
                | KeygateError::UpstreamUnavailable(_)
                | KeygateError::TelemetryUnavailable(_)
        )
    }

    /// HTTP-style status code for surfacing the error to a caller.
    pub fn status_code(&self) -> u16 {
        match self {
            KeygateError::MissingCredential | KeygateError::ProtocolError(_) => 400,
            KeygateError::SignatureInvalid => 403,
            KeygateError::StorageUnavailable(_)
            | KeygateError::UpstreamUnavailable(_)
            | KeygateError::TelemetryUnavailable(_) => 503,
            KeygateError::ConfigError(_) => 500,
        }
    }
}
