//! Telemetry sink implementations.

use crate::telemetry::{TelemetrySink, UsageEvent};
use crate::KeygateError;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

/// Writes usage events as structured `tracing` events on target `keygate::usage`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn record(&self, event: UsageEvent) -> Result<(), KeygateError> {
        info!(
            target: "keygate::usage",
            account_id = %event.account_id,
            application_id = %event.application_id,
            key_id = %event.key_id,
            application_name = %event.application_name,
            success = event.success,
            ip_address = event.ip_address,
            user_agent = %event.user_agent,
            timestamp = %event.timestamp.to_rfc3339(),
            "key usage"
        );
        Ok(())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<UsageEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first.
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn record(&self, event: UsageEvent) -> Result<(), KeygateError> {
        self.events
            .lock()
            .map_err(|_| KeygateError::TelemetryUnavailable("sink lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
