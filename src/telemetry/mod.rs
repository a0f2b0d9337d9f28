//! Usage telemetry.
//!
//! Every verification decision (except a failed token signature) produces
//! one [`UsageEvent`]. Events go through a bounded [`TelemetryEmitter`]
//! queue so a slow sink never delays a verdict.

pub mod emitter;
pub mod sink;

use crate::directory::KeyIdentity;
use crate::KeygateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;

pub use emitter::TelemetryEmitter;
pub use sink::{MemorySink, TracingSink};

/// Caller-supplied request metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTelemetry {
    /// Request URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Request method.
    #[serde(default)]
    pub method: Option<String>,
    /// Request headers, lowercase names.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Client IPv4 address.
    #[serde(default, rename = "ipaddress")]
    pub ip_address: Option<String>,
    /// Client-side timestamp.
    #[serde(default)]
    pub time_stamp: Option<String>,
}

impl RequestTelemetry {
    /// The `user-agent` header, or an empty string.
    pub fn user_agent(&self) -> &str {
        self.headers
            .get("user-agent")
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// The client address as a decimal IPv4 number, 0 when absent or invalid.
    pub fn ip_decimal(&self) -> u32 {
        self.ip_address.as_deref().map(ip_to_decimal).unwrap_or(0)
    }
}

/// Convert a dotted IPv4 address to its decimal value. Invalid input is 0.
pub fn ip_to_decimal(address: &str) -> u32 {
    address
        .trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .unwrap_or(0)
}

/// One verification attempt, as recorded for analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    /// Owning account id, empty when the key was not found.
    pub account_id: String,
    /// Application id.
    pub application_id: String,
    /// Key record id, empty when the key was not found.
    pub key_id: String,
    /// Application display name.
    pub application_name: String,
    /// Whether the credential was accepted.
    pub success: bool,
    /// Client IPv4 address as a decimal number.
    pub ip_address: u32,
    /// Client user agent.
    pub user_agent: String,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    /// Build an event for a resolved key.
    pub fn for_identity(
        identity: &KeyIdentity,
        success: bool,
        request: Option<&RequestTelemetry>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: identity.account_id.clone(),
            application_id: identity.application_id.clone(),
            key_id: identity.key_id.clone(),
            application_name: identity.application_name.clone(),
            success,
            ip_address: request.map(RequestTelemetry::ip_decimal).unwrap_or(0),
            user_agent: request
                .map(|r| r.user_agent().to_string())
                .unwrap_or_default(),
            timestamp,
        }
    }

    /// Build an event for an unknown key: zeroed identity.
    pub fn for_unknown_key(
        application_id: &str,
        request: Option<&RequestTelemetry>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let identity = KeyIdentity {
            application_id: application_id.to_string(),
            application_name: "unknown".to_string(),
            ..KeyIdentity::default()
        };
        Self::for_identity(&identity, false, request, timestamp)
    }
}

/// Destination for usage events.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Record one event.
    async fn record(&self, event: UsageEvent) -> Result<(), KeygateError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> RequestTelemetry {
        let mut headers = HashMap::new();
        headers.insert("user-agent".to_string(), "curl/8.0".to_string());
        RequestTelemetry {
            url: Some("https://api.example.com/v1/items".to_string()),
            method: Some("GET".to_string()),
            headers,
            ip_address: Some("192.168.1.10".to_string()),
            time_stamp: None,
        }
    }

    #[test]
    fn ip_to_decimal_valid() {
        assert_eq!(ip_to_decimal("192.168.1.10"), 3_232_235_786);
        assert_eq!(ip_to_decimal("0.0.0.1"), 1);
    }

    #[test]
    fn ip_to_decimal_invalid_is_zero() {
        assert_eq!(ip_to_decimal("256.1.1.1"), 0);
        assert_eq!(ip_to_decimal("1.2.3"), 0);
        assert_eq!(ip_to_decimal("::1"), 0);
        assert_eq!(ip_to_decimal(""), 0);
    }

    #[test]
    fn request_telemetry_parses_wire_names() {
        let json = r#"{"url":"/x","method":"POST","headers":{"user-agent":"ua"},
                       "ipaddress":"10.0.0.1","timeStamp":"now"}"#;
        let parsed: RequestTelemetry = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.user_agent(), "ua");
        assert_eq!(parsed.ip_decimal(), 167_772_161);
        assert_eq!(parsed.time_stamp.as_deref(), Some("now"));
    }

    #[test]
    fn missing_user_agent_is_empty() {
        assert_eq!(RequestTelemetry::default().user_agent(), "");
        assert_eq!(RequestTelemetry::default().ip_decimal(), 0);
    }

    #[test]
    fn unknown_key_event_has_zeroed_identity() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let event = UsageEvent::for_unknown_key("app-1", Some(&request()), at);

        assert_eq!(event.account_id, "");
        assert_eq!(event.key_id, "");
        assert_eq!(event.application_id, "app-1");
        assert!(!event.success);
        assert_eq!(event.user_agent, "curl/8.0");
        assert_eq!(event.ip_address, 3_232_235_786);
    }
}
