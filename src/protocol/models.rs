//! Wire messages of the counter actors.
//!
//! Each actor answers query-string requests addressed by credential:
//! `?key=K[&...]`. Responses are a status code plus a JSON body.

use crate::policy::RateLimitPolicy;
use crate::KeygateError;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Parsed query string. Later duplicates win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: HashMap<String, String>,
}

impl Query {
    /// Parse `query`, with or without a leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            params: url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    /// Value of `name`, treating an empty value as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether flag `name` is set. Present with an empty value counts.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.params.get(name).map(String::as_str), Some(v) if v != "false" && v != "0")
    }

    /// Parse `name` as an unsigned integer.
    pub fn number(&self, name: &str) -> Result<Option<u64>, KeygateError> {
        self.get(name)
            .map(|raw| {
                raw.parse::<u64>().map_err(|_| {
                    KeygateError::ProtocolError(format!("{} must be a non-negative integer", name))
                })
            })
            .transpose()
    }
}

/// A request to the rate limiter actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitRequest {
    /// `?key=K[&limit=L&window=W]`. `policy` is `None` when either is absent.
    CheckAndConsume {
        /// Raw credential.
        key: String,
        /// Policy carried by the request, for counters seeded without a
        /// directory record.
        policy: Option<RateLimitPolicy>,
    },
    /// `?key=K&init=&set=V[&window=W]`.
    Initialize {
        /// Raw credential.
        key: String,
        /// Calls already counted in the seeded window.
        count: u64,
        /// Seeded window length; 0 when absent.
        window_seconds: u64,
    },
}

impl RateLimitRequest {
    /// Parse a rate limiter query string.
    pub fn parse(query: &str) -> Result<Self, KeygateError> {
        let query = Query::parse(query);
        let key = query
            .get("key")
            .ok_or(KeygateError::MissingCredential)?
            .to_string();

        if query.flag("init") {
            return Ok(RateLimitRequest::Initialize {
                key,
                count: query.number("set")?.unwrap_or(0),
                window_seconds: query.number("window")?.unwrap_or(0),
            });
        }

        let policy = match (query.number("limit")?, query.number("window")?) {
            (Some(limit), Some(window_seconds)) => Some(RateLimitPolicy {
                limit,
                window_seconds,
            }),
            _ => None,
        };
        Ok(RateLimitRequest::CheckAndConsume { key, policy })
    }
}

/// A request to the quota actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaRequest {
    /// `?key=K&get=true`.
    Peek {
        /// Raw credential.
        key: String,
    },
    /// `?key=K`.
    CheckAndConsume {
        /// Raw credential.
        key: String,
    },
    /// `?key=K&init=&set=V`. `remaining` is `None` when `set` is absent.
    Initialize {
        /// Raw credential.
        key: String,
        /// Seeded remaining quota.
        remaining: Option<u64>,
    },
}

impl QuotaRequest {
    /// Parse a quota query string.
    pub fn parse(query: &str) -> Result<Self, KeygateError> {
        let query = Query::parse(query);
        let key = query
            .get("key")
            .ok_or(KeygateError::MissingCredential)?
            .to_string();

        if query.flag("get") {
            return Ok(QuotaRequest::Peek { key });
        }
        if query.flag("init") {
            return Ok(QuotaRequest::Initialize {
                key,
                remaining: query.number("set")?,
            });
        }
        Ok(QuotaRequest::CheckAndConsume { key })
    }
}

/// Status and JSON body of a wire response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
}

impl WireResponse {
    /// Build a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// `{error}` body with `status`.
    pub fn error(status: u16, message: &str) -> Self {
        Self::new(status, json!({ "error": message }))
    }

    /// `{error, remaining: 0}` body with 429.
    pub fn exhausted(message: &str) -> Self {
        Self::new(429, json!({ "error": message, "remaining": 0 }))
    }

    /// Map an error to its status and `{error}` body.
    pub fn from_error(error: &KeygateError) -> Self {
        let message = match error {
            KeygateError::MissingCredential => "Key is required".to_string(),
            other => other.to_string(),
        };
        Self::error(error.status_code(), &message)
    }
}
