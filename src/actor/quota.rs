//! Usage quota actor.
//!
//! One counter per credential holding the remaining number of uses. The
//! counter only goes down, except when it is re-seeded at key issuance or by
//! an administrative refill.

use crate::actor::{decode, encode, ActorRegistry, Outcome};
use crate::credential::hash::CredentialHash;
use crate::store::CounterStore;
use crate::KeygateError;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::error;

pub(crate) enum QuotaCommand {
    CheckAndConsume {
        reply: oneshot::Sender<Result<Option<Outcome>, KeygateError>>,
    },
    Initialize {
        remaining: u64,
        reply: oneshot::Sender<Result<(), KeygateError>>,
    },
    Peek {
        reply: oneshot::Sender<Result<Option<u64>, KeygateError>>,
    },
}

/// Handle to the quota actors of every credential.
pub struct QuotaActor {
    registry: ActorRegistry<QuotaCommand>,
}

impl QuotaActor {
    /// Create the quota actor over a counter store.
    ///
    /// Actor tasks are spawned lazily on the current tokio runtime.
    pub fn new(store: Arc<dyn CounterStore>, mailbox_capacity: usize) -> Self {
        let registry = ActorRegistry::new(
            mailbox_capacity,
            Arc::new(move |key: CredentialHash, inbox: mpsc::Receiver<QuotaCommand>| {
                tokio::spawn(run(key, inbox, store.clone()));
            }),
        );
        Self { registry }
    }

    /// Consume one unit of quota.
    ///
    /// Returns `Ok(None)` when the credential was never seeded with a quota.
    pub async fn check_and_consume(
        &self,
        key: &CredentialHash,
    ) -> Result<Option<Outcome>, KeygateError> {
        self.registry
            .request(key, |reply| QuotaCommand::CheckAndConsume { reply })
            .await
    }

    /// Overwrite the remaining quota for `key`.
    pub async fn initialize(
        &self,
        key: &CredentialHash,
        remaining: u64,
    ) -> Result<(), KeygateError> {
        self.registry
            .request(key, |reply| QuotaCommand::Initialize { remaining, reply })
            .await
    }

    /// Read the remaining quota without consuming it.
    pub async fn peek(&self, key: &CredentialHash) -> Result<Option<u64>, KeygateError> {
        self.registry
            .request(key, |reply| QuotaCommand::Peek { reply })
            .await
    }
}

fn storage_key(key: &CredentialHash) -> String {
    format!("quota.{}", key)
}

async fn run(
    key: CredentialHash,
    mut inbox: mpsc::Receiver<QuotaCommand>,
    store: Arc<dyn CounterStore>,
) {
    let storage_key = storage_key(&key);

    while let Some(command) = inbox.recv().await {
        match command {
            QuotaCommand::CheckAndConsume { reply } => {
                let result = consume(store.as_ref(), &storage_key).await;
                if let Err(e) = &result {
                    error!(key = key.short(), error = %e, "quota counter unavailable");
                }
                let _ = reply.send(result);
            }
            QuotaCommand::Initialize { remaining, reply } => {
                let result = match encode(&remaining) {
                    Ok(json) => store.put(&storage_key, json).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            QuotaCommand::Peek { reply } => {
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
) -> Result<Option<Outcome>, KeygateError> {
    let remaining: u64 = match decode(store.get(storage_key).await?)? {
        Some(remaining) => remaining,
        None => return Ok(None),
    };

    if remaining == 0 {
        return Ok(Some(Outcome::denied()));
    }

    let remaining = remaining - 1;
    store.put(storage_key, encode(&remaining)?).await?;
    Ok(Some(Outcome::allowed(remaining)))
}
