//! Fixed-window rate limiter actor.
//!
//! One counter per credential: how many calls were admitted in the current
//! window and when that window ends. Windows reset lazily on the first call
//! after expiry; nothing sweeps expired counters in the background.
//!
//! A fixed window admits up to twice the limit across a window boundary
//! (a burst at the end of one window plus a burst at the start of the
//! next).

use crate::actor::{decode, encode, ActorRegistry, Outcome};
use crate::clock::Clock;
use crate::credential::hash::CredentialHash;
use crate::policy::RateLimitPolicy;
use crate::store::CounterStore;
use crate::KeygateError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::error;

/// Persisted state of one credential's window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowCounter {
    /// Calls admitted in the current window.
    pub count: u64,
    /// End of the current window, fractional seconds since the Unix epoch.
    pub window_expires_at: f64,
}

impl WindowCounter {
    /// An empty window starting at `now`.
    pub fn fresh(now: f64, window_seconds: u64) -> Self {
        Self {
            count: 0,
            window_expires_at: now + window_seconds as f64,
        }
    }

    /// Apply one check-and-consume at time `now`.
    ///
    /// Returns the counter to persist (`None` when nothing changed) and the
    /// outcome. Rejected calls do not consume budget.
    pub fn check_and_consume(
        current: Option<Self>,
        now: f64,
        policy: RateLimitPolicy,
    ) -> (Option<Self>, Outcome) {
        let mut changed = current.is_none();
        let mut counter = current.unwrap_or_else(|| Self::fresh(now, policy.window_seconds));

        if now >= counter.window_expires_at {
            counter = Self::fresh(now, policy.window_seconds);
            changed = true;
        }

        if counter.count >= policy.limit {
            return (changed.then_some(counter), Outcome::denied());
        }

        counter.count += 1;
        (Some(counter), Outcome::allowed(policy.limit - counter.count))
    }
}

pub(crate) enum RateLimitCommand {
    CheckAndConsume {
        policy: RateLimitPolicy,
        reply: oneshot::Sender<Result<Outcome, KeygateError>>,
    },
    Initialize {
        counter: WindowCounter,
        reply: oneshot::Sender<Result<(), KeygateError>>,
    },
    Peek {
        reply: oneshot::Sender<Result<Option<WindowCounter>, KeygateError>>,
    },
}

/// Handle to the rate limiter actors of every credential.
pub struct RateLimiterActor {
    registry: ActorRegistry<RateLimitCommand>,
    clock: Arc<dyn Clock>,
}

impl RateLimiterActor {
    /// Create the rate limiter over a counter store.
    ///
    /// Actor tasks are spawned lazily on the current tokio runtime.
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        mailbox_capacity: usize,
    ) -> Self {
        let actor_clock = clock.clone();
        let registry = ActorRegistry::new(
            mailbox_capacity,
            Arc::new(move |key: CredentialHash, inbox: mpsc::Receiver<RateLimitCommand>| {
                tokio::spawn(run(key, inbox, store.clone(), actor_clock.clone()));
            }),
        );
        Self { registry, clock }
    }

    /// Admit one call against `policy` if the current window has budget.
    pub async fn check_and_consume(
        &self,
        key: &CredentialHash,
        policy: RateLimitPolicy,
    ) -> Result<Outcome, KeygateError> {
        self.registry
            .request(key, |reply| RateLimitCommand::CheckAndConsume { policy, reply })
            .await
    }

    /// Overwrite the counter for `key`.
    pub async fn initialize(
        &self,
        key: &CredentialHash,
        counter: WindowCounter,
    ) -> Result<(), KeygateError> {
        self.registry
            .request(key, |reply| RateLimitCommand::Initialize { counter, reply })
            .await
    }

    /// Seed an empty window of `window_seconds` starting now.
    pub async fn initialize_fresh(
        &self,
        key: &CredentialHash,
        window_seconds: u64,
    ) -> Result<(), KeygateError> {
        let counter = WindowCounter::fresh(self.clock.now_epoch_seconds(), window_seconds);
        self.initialize(key, counter).await
    }

    /// Read the stored counter without changing it.
    pub async fn peek(&self, key: &CredentialHash) -> Result<Option<WindowCounter>, KeygateError> {
        self.registry
            .request(key, |reply| RateLimitCommand::Peek { reply })
            .await
    }

    /// Current time according to the actor clock.
    pub(crate) fn now_epoch_seconds(&self) -> f64 {
        self.clock.now_epoch_seconds()
    }
}

fn storage_key(key: &CredentialHash) -> String {
    format!("ratelimit.{}", key)
}

async fn run(
    key: CredentialHash,
    mut inbox: mpsc::Receiver<RateLimitCommand>,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
) {
    let storage_key = storage_key(&key);

    while let Some(command) = inbox.recv().await {
        match command {
            RateLimitCommand::CheckAndConsume { policy, reply } => {
                let now = clock.now_epoch_seconds();
                let result = consume(store.as_ref(), &storage_key, now, policy).await;
                if let Err(e) = &result {
                    error!(key = key.short(), error = %e, "rate limit counter unavailable");
                }
                let _ = reply.send(result);
            }
            RateLimitCommand::Initialize { counter, reply } => {
                let result = match encode(&counter) {
                    Ok(json) => store.put(&storage_key, json).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            RateLimitCommand::Peek { reply } => {
                let result = match store.get(&storage_key).await {
                    Ok(raw) => decode(raw),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
        }
    }
}

async fn consume(
    store: &dyn CounterStore,
    storage_key: &str,
    now: f64,
    policy: RateLimitPolicy,
) -> Result<Outcome, KeygateError> {
    let current: Option<WindowCounter> = decode(store.get(storage_key).await?)?;
    let (next, outcome) = WindowCounter::check_and_consume(current, now, policy);
    if let Some(next) = next {
        store.put(storage_key, encode(&next)?).await?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::store::MemoryCounterStore;
    use async_trait::async_trait;

    const T0: f64 = 1_736_942_400.0;

    fn policy(limit: u64, window_seconds: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            limit,
            window_seconds,
        }
    }

    #[test]
    fn first_call_opens_window() {
        let (next, outcome) = WindowCounter::check_and_consume(None, T0, policy(3, 60));
        assert_eq!(outcome, Outcome::allowed(2));
        assert_eq!(
            next,
            Some(WindowCounter {
                count: 1,
                window_expires_at: T0 + 60.0
            })
        );
    }

    #[test]
    fn full_window_rejects_without_consuming() {
        let full = WindowCounter {
            count: 2,
            window_expires_at: T0 + 30.0,
        };
        let (next, outcome) = WindowCounter::check_and_consume(Some(full), T0, policy(2, 60));
        assert_eq!(outcome, Outcome::denied());
        assert_eq!(next, None);
    }

    #[test]
    fn expired_window_resets_lazily() {
        let full = WindowCounter {
            count: 2,
            window_expires_at: T0,
        };
        let (next, outcome) = WindowCounter::check_and_consume(Some(full), T0, policy(2, 60));
        assert_eq!(outcome, Outcome::allowed(1));
        assert_eq!(next.unwrap().count, 1);
        assert_eq!(next.unwrap().window_expires_at, T0 + 60.0);
    }

    #[test]
    fn zero_limit_never_admits() {
        let (_, outcome) = WindowCounter::check_and_consume(None, T0, policy(0, 60));
        assert_eq!(outcome, Outcome::denied());

        let stale = WindowCounter {
            count: 0,
            window_expires_at: T0 - 1.0,
        };
        let (_, outcome) = WindowCounter::check_and_consume(Some(stale), T0, policy(0, 60));
        assert_eq!(outcome, Outcome::denied());
    }

    fn limiter(clock: Arc<MockClock>) -> RateLimiterActor {
        RateLimiterActor::new(Arc::new(MemoryCounterStore::new()), clock, 64)
    }

    #[tokio::test]
    async fn window_rollover_gives_independent_budget() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let limiter = limiter(clock.clone());
        let key = CredentialHash::of("rollover");

        let first = limiter.check_and_consume(&key, policy(1, 60)).await.unwrap();
        assert_eq!(first, Outcome::allowed(0));
        let blocked = limiter.check_and_consume(&key, policy(1, 60)).await.unwrap();
        assert_eq!(blocked, Outcome::denied());

        clock.advance(chrono::Duration::seconds(61));
        let after = limiter.check_and_consume(&key, policy(1, 60)).await.unwrap();
        assert_eq!(after, Outcome::allowed(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_admit_exactly_the_limit() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let limiter = Arc::new(limiter(clock));
        let key = CredentialHash::of("contended");

        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = limiter.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                limiter.check_and_consume(&key, policy(7, 60)).await.unwrap()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 7);
        assert_eq!(limiter.peek(&key).await.unwrap().unwrap().count, 7);
    }

    #[tokio::test]
    async fn fewer_calls_than_limit_all_admitted() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let limiter = limiter(clock);
        let key = CredentialHash::of("light");

        for expected_remaining in (7..10).rev() {
            let outcome = limiter.check_and_consume(&key, policy(10, 60)).await.unwrap();
            assert_eq!(outcome, Outcome::allowed(expected_remaining));
        }
    }

    #[tokio::test]
    async fn initialize_overwrites_counter() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let limiter = limiter(clock.clone());
        let key = CredentialHash::of("seeded");

        let seeded = WindowCounter {
            count: 4,
            window_expires_at: clock.now_epoch_seconds() + 60.0,
        };
        limiter.initialize(&key, seeded).await.unwrap();
        assert_eq!(limiter.peek(&key).await.unwrap(), Some(seeded));

        let outcome = limiter.check_and_consume(&key, policy(5, 60)).await.unwrap();
        assert_eq!(outcome, Outcome::allowed(0));

        limiter.initialize_fresh(&key, 60).await.unwrap();
        assert_eq!(limiter.peek(&key).await.unwrap().unwrap().count, 0);
    }

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, KeygateError> {
            Err(KeygateError::StorageUnavailable("disk offline".to_string()))
        }

        async fn put(&self, _key: &str, _value: String) -> Result<(), KeygateError> {
            Err(KeygateError::StorageUnavailable("disk offline".to_string()))
        }
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_unavailable() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let limiter = RateLimiterActor::new(Arc::new(BrokenStore), clock, 8);
        let key = CredentialHash::of("broken");

        let result = limiter.check_and_consume(&key, policy(5, 60)).await;
        assert!(matches!(result, Err(KeygateError::StorageUnavailable(_))));
    }
}
