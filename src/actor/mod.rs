//! Per-credential counter actors.
//!
//! Every credential that has a counter gets its own tokio task draining a
//! bounded mailbox. The task is the only code that touches that
//! credential's counter, and it runs one command to completion before
//! receiving the next, so load-modify-persist sequences never interleave.
//! Different credentials run on independent tasks.

pub mod quota;
pub mod rate_limit;

use crate::credential::hash::CredentialHash;
use crate::KeygateError;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

pub use quota::QuotaActor;
pub use rate_limit::{RateLimiterActor, WindowCounter};

/// Result of a check-and-consume operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Whether the call was admitted and consumed one unit of budget.
    pub allowed: bool,
    /// Budget left after this call.
    pub remaining: u64,
}

impl Outcome {
    pub(crate) fn allowed(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
        }
    }

    pub(crate) fn denied() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }
}

/// Starts the task that owns one credential's mailbox.
pub(crate) type SpawnActor<C> = Arc<dyn Fn(CredentialHash, mpsc::Receiver<C>) + Send + Sync>;

/// Routing table from credential hash to actor mailbox.
///
/// Entries are created on first reference and never torn down. A mailbox
/// whose task has stopped is replaced on the next call.
pub(crate) struct ActorRegistry<C> {
    mailboxes: DashMap<CredentialHash, mpsc::Sender<C>>,
    capacity: usize,
    spawn: SpawnActor<C>,
}

impl<C: Send + 'static> ActorRegistry<C> {
    pub(crate) fn new(capacity: usize, spawn: SpawnActor<C>) -> Self {
        Self {
            mailboxes: DashMap::new(),
            capacity,
            spawn,
        }
    }

    fn start(&self, key: &CredentialHash) -> mpsc::Sender<C> {
        let (tx, rx) = mpsc::channel(self.capacity);
        (self.spawn)(key.clone(), rx);
        trace!(key = key.short(), "spawned counter actor");
        tx
    }

    fn mailbox(&self, key: &CredentialHash) -> mpsc::Sender<C> {
        if let Some(tx) = self.mailboxes.get(key).map(|entry| entry.value().clone()) {
            if !tx.is_closed() {
                return tx;
            }
        }

        let mut entry = self
            .mailboxes
            .entry(key.clone())
            .or_insert_with(|| self.start(key));
        if entry.is_closed() {
            *entry = self.start(key);
        }
        entry.value().clone()
    }

    /// Queue a command on the actor owning `key`.
    ///
    /// Waits for mailbox capacity. Once this returns `Ok` the command will
    /// run even if the caller stops waiting for its reply.
    pub(crate) async fn send(&self, key: &CredentialHash, command: C) -> Result<(), KeygateError> {
        let tx = self.mailbox(key);
        match tx.send(command).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(command)) => {
                self.mailboxes
                    .remove_if(key, |_, current| current.same_channel(&tx));
                self.mailbox(key).send(command).await.map_err(|_| {
                    KeygateError::StorageUnavailable("counter actor unavailable".to_string())
                })
            }
        }
    }

    /// Send a command built around a reply channel and wait for the reply.
    pub(crate) async fn request<T>(
        &self,
        key: &CredentialHash,
        build: impl FnOnce(oneshot::Sender<Result<T, KeygateError>>) -> C,
    ) -> Result<T, KeygateError> {
        let (reply, response) = oneshot::channel();
        self.send(key, build(reply)).await?;
        response.await.map_err(|_| {
            KeygateError::StorageUnavailable("counter actor dropped the request".to_string())
        })?
    }

    /// Number of live routing entries.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.mailboxes.len()
    }
}

/// Decode a stored counter value.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    raw: Option<String>,
) -> Result<Option<T>, KeygateError> {
    raw.map(|json| {
        serde_json::from_str(&json).map_err(|e| {
            KeygateError::StorageUnavailable(format!("Corrupt counter value: {}", e))
        })
    })
    .transpose()
}

/// Encode a counter value for storage.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<String, KeygateError> {
    serde_json::to_string(value)
        .map_err(|e| KeygateError::StorageUnavailable(format!("Failed to encode counter: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Ping {
        Echo(u32, oneshot::Sender<Result<u32, KeygateError>>),
    }

    fn echo_registry(spawned: Arc<AtomicUsize>) -> ActorRegistry<Ping> {
        ActorRegistry::new(
            4,
            Arc::new(move |_key: CredentialHash, mut inbox: mpsc::Receiver<Ping>| {
                spawned.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    while let Some(Ping::Echo(value, reply)) = inbox.recv().await {
                        let _ = reply.send(Ok(value));
                    }
                });
            }),
        )
    }

    #[tokio::test]
    async fn same_key_reuses_one_actor() {
        let spawned = Arc::new(AtomicUsize::new(0));
        let registry = echo_registry(spawned.clone());
        let key = CredentialHash::of("key-a");

        for i in 0..5 {
            let value = registry
                .request(&key, |reply| Ping::Echo(i, reply))
                .await
                .unwrap();
            assert_eq!(value, i);
        }

        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_actors() {
        let spawned = Arc::new(AtomicUsize::new(0));
        let registry = echo_registry(spawned.clone());

        registry
            .request(&CredentialHash::of("a"), |reply| Ping::Echo(1, reply))
            .await
            .unwrap();
        registry
            .request(&CredentialHash::of("b"), |reply| Ping::Echo(2, reply))
            .await
            .unwrap();

        assert_eq!(spawned.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn stopped_actor_is_replaced() {
        let spawned = Arc::new(AtomicUsize::new(0));
        let counter = spawned.clone();
        // The first actor exits after one message; later ones keep running.
        let registry: ActorRegistry<Ping> = ActorRegistry::new(
            4,
            Arc::new(move |_key: CredentialHash, mut inbox: mpsc::Receiver<Ping>| {
                let generation = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    while let Some(Ping::Echo(value, reply)) = inbox.recv().await {
                        let _ = reply.send(Ok(value));
                        if generation == 0 {
                            break;
                        }
                    }
                });
            }),
        );
        let key = CredentialHash::of("flaky");

        assert_eq!(registry.request(&key, |r| Ping::Echo(1, r)).await.unwrap(), 1);
        // Give the first task a chance to exit and drop its receiver.
        while !registry
            .mailboxes
            .get(&key)
            .map(|tx| tx.is_closed())
            .unwrap_or(true)
        {
            tokio::task::yield_now().await;
        }
        assert_eq!(registry.request(&key, |r| Ping::Echo(2, r)).await.unwrap(), 2);
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn decode_rejects_corrupt_value() {
        let result: Result<Option<u64>, _> = decode(Some("not-json".to_string()));
        assert!(matches!(result, Err(KeygateError::StorageUnavailable(_))));
    }

    #[test]
    fn decode_absent_is_none() {
        let result: Option<u64> = decode(None).unwrap();
        assert!(result.is_none());
    }
}
