//! Query-string front ends of the counter actors.

use crate::actor::{QuotaActor, RateLimiterActor, WindowCounter};
use crate::credential::hash::CredentialHash;
use crate::directory::CredentialDirectory;
use crate::policy::RateLimitPolicy;
use crate::protocol::models::{QuotaRequest, RateLimitRequest, WireResponse};
use crate::KeygateError;
use serde_json::json;
use tracing::debug;

/// Resolve the policy governing `key`.
///
/// The key's directory record wins. A policy carried by the query only
/// applies to a counter that was already seeded.
async fn resolve_policy(
    limiter: &RateLimiterActor,
    directory: &dyn CredentialDirectory,
    key: &str,
    hash: &CredentialHash,
    carried: Option<RateLimitPolicy>,
) -> Result<Option<RateLimitPolicy>, KeygateError> {
    if let Some(policy) = directory
        .lookup(key)
        .await?
        .and_then(|record| record.metadata.rate_limit)
    {
        return Ok(Some(policy));
    }
    match carried {
        Some(policy) if limiter.peek(hash).await?.is_some() => Ok(Some(policy)),
        _ => Ok(None),
    }
}

/// Answer one rate limiter query.
///
/// * `?key=K[&limit=L&window=W]` - `200 {remaining}` or `429 {error, remaining: 0}`
/// * `?key=K` with no policy for the key - `401`
/// * `?key=K&init=&set=V[&window=W]` - seeds the counter, `201`
pub async fn handle_rate_limit(
    limiter: &RateLimiterActor,
    directory: &dyn CredentialDirectory,
    query: &str,
) -> WireResponse {
    let request = match RateLimitRequest::parse(query) {
        Ok(request) => request,
        Err(e) => return WireResponse::from_error(&e),
    };

    match request {
        RateLimitRequest::Initialize {
            key,
            count,
            window_seconds,
        } => {
            let counter = WindowCounter {
                count,
                window_expires_at: limiter.now_epoch_seconds() + window_seconds as f64,
            };
            match limiter.initialize(&CredentialHash::of(&key), counter).await {
                Ok(()) => WireResponse::new(201, json!(counter)),
                Err(e) => WireResponse::from_error(&e),
            }
        }
        RateLimitRequest::CheckAndConsume { key, policy } => {
            let hash = CredentialHash::of(&key);
            let policy = match resolve_policy(limiter, directory, &key, &hash, policy).await {
                Ok(Some(policy)) => policy,
                Ok(None) => return WireResponse::error(401, "Invalid key"),
                Err(e) => return WireResponse::from_error(&e),
            };
            match limiter.check_and_consume(&hash, policy).await {
                Ok(outcome) if outcome.allowed => {
                    WireResponse::new(200, json!({ "remaining": outcome.remaining }))
                }
                Ok(_) => {
                    debug!(key = hash.short(), "rate limit exceeded");
                    WireResponse::exhausted("Rate limit exceeded")
                }
                Err(e) => WireResponse::from_error(&e),
            }
        }
    }
}

/// Answer one quota query.
///
/// * `?key=K&get=true` - `200 {remaining}`, `null` when unseeded
/// * `?key=K` - `200 {remaining}`, `429 {error, remaining: 0}`, `401` if unseeded
/// * `?key=K&init=&set=V` - seeds the quota, `201`; `401` without `set`
pub async fn handle_quota(quota: &QuotaActor, query: &str) -> WireResponse {
    let request = match QuotaRequest::parse(query) {
        Ok(request) => request,
        Err(e) => return WireResponse::from_error(&e),
    };

    match request {
        QuotaRequest::Peek { key } => match quota.peek(&CredentialHash::of(&key)).await {
            Ok(remaining) => WireResponse::new(200, json!({ "remaining": remaining })),
            Err(e) => WireResponse::from_error(&e),
        },
        QuotaRequest::Initialize { remaining: None, .. } => {
            WireResponse::error(401, "set is missing")
        }
        QuotaRequest::Initialize {
            key,
            remaining: Some(remaining),
        } => match quota.initialize(&CredentialHash::of(&key), remaining).await {
            Ok(()) => WireResponse::new(201, json!({ "remaining": remaining })),
            Err(e) => WireResponse::from_error(&e),
        },
        QuotaRequest::CheckAndConsume { key } => {
            let hash = CredentialHash::of(&key);
            match quota.check_and_consume(&hash).await {
                Ok(Some(outcome)) if outcome.allowed => {
                    WireResponse::new(200, json!({ "remaining": outcome.remaining }))
                }
                Ok(Some(_)) => {
                    debug!(key = hash.short(), "quota exhausted");
                    WireResponse::exhausted("Usage limit exceeded")
                }
                Ok(None) => WireResponse::error(401, "Invalid key"),
                Err(e) => WireResponse::from_error(&e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};
    use crate::directory::{CredentialMetadata, CredentialRecord, KeyIdentity, MemoryDirectory};
    use crate::store::MemoryCounterStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    fn limiter(clock: Arc<MockClock>) -> RateLimiterActor {
        RateLimiterActor::new(Arc::new(MemoryCounterStore::new()), clock, 16)
    }

    fn directory_with(key: &str, rate_limit: Option<RateLimitPolicy>) -> MemoryDirectory {
        let directory = MemoryDirectory::new();
        directory.insert(
            key,
            CredentialRecord {
                identity: KeyIdentity::default(),
                metadata: CredentialMetadata {
                    active: true,
                    expires_at_ms: None,
                    rate_limit,
                    quota: None,
                },
            },
        );
        directory
    }

    fn quota() -> QuotaActor {
        QuotaActor::new(Arc::new(MemoryCounterStore::new()), 16)
    }

    fn policy(limit: u64, window_seconds: u64) -> Option<RateLimitPolicy> {
        Some(RateLimitPolicy {
            limit,
            window_seconds,
        })
    }

    #[tokio::test]
    async fn rate_limit_counts_down_then_429() {
        let limiter = limiter(Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z")));
        let directory = directory_with("abc", policy(2, 60));

        let first = handle_rate_limit(&limiter, &directory, "?key=abc").await;
        assert_eq!(first.status, 200);
        assert_eq!(first.body["remaining"], 1);

        let second = handle_rate_limit(&limiter, &directory, "?key=abc").await;
        assert_eq!(second.body["remaining"], 0);

        let third = handle_rate_limit(&limiter, &directory, "?key=abc").await;
        assert_eq!(third.status, 429);
        assert_eq!(third.body["remaining"], 0);
    }

    #[tokio::test]
    async fn rate_limit_bare_key_after_init_uses_directory_policy() {
        let limiter = limiter(Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z")));
        let directory = directory_with("abc", policy(5, 60));

        let seeded =
            handle_rate_limit(&limiter, &directory, "?key=abc&init=&set=0&window=60").await;
        assert_eq!(seeded.status, 201);

        let response = handle_rate_limit(&limiter, &directory, "?key=abc").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["remaining"], 4);
    }

    #[tokio::test]
    async fn rate_limit_directory_policy_wins_over_query() {
        let limiter = limiter(Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z")));
        let directory = directory_with("abc", policy(1, 60));

        let first = handle_rate_limit(&limiter, &directory, "?key=abc&limit=50&window=60").await;
        assert_eq!(first.body["remaining"], 0);
        let second = handle_rate_limit(&limiter, &directory, "?key=abc&limit=50&window=60").await;
        assert_eq!(second.status, 429);
    }

    #[tokio::test]
    async fn rate_limit_unprovisioned_key_is_401() {
        let limiter = limiter(Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z")));
        let directory = MemoryDirectory::new();

        let bare = handle_rate_limit(&limiter, &directory, "?key=abc").await;
        assert_eq!(bare.status, 401);
        assert_eq!(bare.body["error"], "Invalid key");

        // A policy in the query does not provision an unseeded key.
        let carried = handle_rate_limit(&limiter, &directory, "?key=abc&limit=2&window=60").await;
        assert_eq!(carried.status, 401);
        assert!(limiter.peek(&CredentialHash::of("abc")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rate_limit_record_without_policy_is_401() {
        let limiter = limiter(Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z")));
        let directory = directory_with("abc", None);
        let response = handle_rate_limit(&limiter, &directory, "?key=abc").await;
        assert_eq!(response.status, 401);
    }

    struct UnreachableDirectory;

    #[async_trait]
    impl CredentialDirectory for UnreachableDirectory {
        async fn lookup(
            &self,
            _credential: &str,
        ) -> Result<Option<CredentialRecord>, KeygateError> {
            Err(KeygateError::UpstreamUnavailable("directory offline".to_string()))
        }

        async fn disable(&self, _credential: &str) -> Result<(), KeygateError> {
            Err(KeygateError::UpstreamUnavailable("directory offline".to_string()))
        }
    }

    #[tokio::test]
    async fn rate_limit_directory_outage_is_503() {
        let limiter = limiter(Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z")));
        let response = handle_rate_limit(&limiter, &UnreachableDirectory, "?key=abc").await;
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn rate_limit_missing_key_is_400() {
        let limiter = limiter(Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z")));
        let directory = MemoryDirectory::new();
        let response = handle_rate_limit(&limiter, &directory, "?limit=2&window=60").await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"], "Key is required");
    }

    #[tokio::test]
    async fn rate_limit_init_seeds_window() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let limiter = limiter(clock.clone());

        let directory = MemoryDirectory::new();

        let seeded =
            handle_rate_limit(&limiter, &directory, "?key=abc&init=&set=2&window=60").await;
        assert_eq!(seeded.status, 201);
        assert_eq!(seeded.body["count"], 2);
        assert_eq!(
            seeded.body["windowExpiresAt"].as_f64(),
            Some(clock.now_epoch_seconds() + 60.0)
        );

        // Seeded without a record: the carried policy applies.
        let next = handle_rate_limit(&limiter, &directory, "?key=abc&limit=3&window=60").await;
        assert_eq!(next.status, 200);
        assert_eq!(next.body["remaining"], 0);
    }

    #[tokio::test]
    async fn quota_get_unseeded_is_null() {
        let quota = quota();
        let response = handle_quota(&quota, "?key=abc&get=true").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["remaining"], Value::Null);
    }

    #[tokio::test]
    async fn quota_consume_unseeded_is_401() {
        let quota = quota();
        let response = handle_quota(&quota, "?key=abc").await;
        assert_eq!(response.status, 401);
    }

    #[tokio::test]
    async fn quota_init_without_set_is_401() {
        let quota = quota();
        let response = handle_quota(&quota, "?key=abc&init=").await;
        assert_eq!(response.status, 401);
        assert_eq!(response.body["error"], "set is missing");
    }

    #[tokio::test]
    async fn quota_lifecycle() {
        let quota = quota();

        let seeded = handle_quota(&quota, "?key=abc&init=&set=1").await;
        assert_eq!(seeded.status, 201);
        assert_eq!(seeded.body["remaining"], 1);

        let peeked = handle_quota(&quota, "?key=abc&get=true").await;
        assert_eq!(peeked.body["remaining"], 1);

        let used = handle_quota(&quota, "?key=abc").await;
        assert_eq!(used.status, 200);
        assert_eq!(used.body["remaining"], 0);

        let exhausted = handle_quota(&quota, "?key=abc").await;
        assert_eq!(exhausted.status, 429);
        assert_eq!(exhausted.body["remaining"], 0);
    }
}
