//! Counter storage backends.
//!
//! A counter store holds one serialized value per key. Each key is written
//! by exactly one actor for its whole lifetime, so stores need no
//! read-modify-write support of their own.

pub mod file;
pub mod memory;

use crate::KeygateError;
use async_trait::async_trait;

pub use file::FileCounterStore;
pub use memory::MemoryCounterStore;

/// Durable key-value storage for counter state.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Load the value stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing was ever stored.
    async fn get(&self, key: &str) -> Result<Option<String>, KeygateError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: String) -> Result<(), KeygateError>;
}
