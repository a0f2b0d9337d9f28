//! Keygate configuration.

use std::time::Duration;

/// Configuration for the verification pipeline and its counter actors.
#[derive(Debug, Clone)]
pub struct KeygateConfig {
    /// Bound of each per-credential actor mailbox.
    /// Callers wait for a free slot when a single credential is flooded.
    pub mailbox_capacity: usize,

    /// Bound of the telemetry queue.
    /// Events that do not fit are dropped, never awaited.
    pub telemetry_capacity: usize,

    /// Upper bound on the best-effort directory write-back after quota
    /// exhaustion.
    pub writeback_timeout: Duration,

    /// Clock skew tolerated when checking `exp` and `nbf` of signed tokens.
    pub token_leeway: Duration,
}

impl Default for KeygateConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            telemetry_capacity: 1024,
            writeback_timeout: Duration::from_secs(2),
            token_leeway: Duration::from_secs(30),
        }
    }
}

impl KeygateConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), crate::KeygateError> {
        if self.mailbox_capacity == 0 {
            return Err(crate::KeygateError::ConfigError(
                "mailbox_capacity must be greater than 0".to_string(),
            ));
        }
        if self.telemetry_capacity == 0 {
            return Err(crate::KeygateError::ConfigError(
                "telemetry_capacity must be greater than 0".to_string(),
            ));
        }
        if self.writeback_timeout.is_zero() {
            return Err(crate::KeygateError::ConfigError(
                "writeback_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
