//! Reqwest-based JWKS key source.
//!
//! Fetches `<base_url>/<application_id>` and expects a JWKS document.

use crate::keysource::{Jwk, JwkSet, KeySource};
use crate::KeygateError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// JWKS endpoint client.
pub struct HttpKeySource {
    client: Client,
    base_url: String,
    user_agent: String,
}

impl HttpKeySource {
    /// Create a key source for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, KeygateError> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a key source with a request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, KeygateError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            KeygateError::ConfigError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: build_user_agent(),
        })
    }

    /// URL of the key document for `application_id`.
    pub fn keys_url(&self, application_id: &str) -> String {
        let segment: String =
            url::form_urlencoded::byte_serialize(application_id.as_bytes()).collect();
        format!("{}/{}", self.base_url, segment)
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn verification_keys(
        &self,
        application_id: &str,
    ) -> Result<Option<Vec<Jwk>>, KeygateError> {
        let response = self
            .client
            .get(self.keys_url(application_id))
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| KeygateError::UpstreamUnavailable(format!("Key fetch failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(KeygateError::UpstreamUnavailable(format!(
                    "Key fetch returned {}",
                    status
                )))
            }
            _ => {}
        }

        // A malformed document is an upstream failure.
        let set: JwkSet = response.json().await.map_err(|e| {
            KeygateError::UpstreamUnavailable(format!("Invalid JWKS document: {}", e))
        })?;
        Ok(Some(set.keys))
    }
}

/// Build the User-Agent string: `keygate/<version>`.
pub fn build_user_agent() -> String {
    format!("keygate/{}", env!("CARGO_PKG_VERSION"))
}
