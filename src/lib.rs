//! # Keygate
//!
//! **Race-free API key verification with per-key rate limits and quotas.**
//!
//! Keygate decides, in the hot path of every authenticated call, whether a
//! credential may be used. Each credential's rate-limit window and usage
//! quota live behind a dedicated actor task, so concurrent requests for the
//! same key are serialized and one unit of budget is never spent twice.
//!
//! ## Features
//!
//! - **Fixed-window rate limiting** with lazy window reset
//! - **Usage quotas** that disable the key when they run out
//! - **Signed-token credentials** verified against JWKS keys (RS, ES, EdDSA)
//! - **Usage telemetry** through a bounded, non-blocking queue
//!
//! ## Quickstart
//!
//! ```no_run
//! use keygate::{
//!     Backends, KeygateConfig, MemoryCounterStore, MemoryDirectory, MemoryKeySource,
//!     TracingSink, VerificationManager, VerifyRequest,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keygate::KeygateError> {
//!     let backends = Backends {
//!         directory: Arc::new(MemoryDirectory::new()),
//!         keys: Arc::new(MemoryKeySource::new()),
//!         counters: Arc::new(MemoryCounterStore::new()),
//!         telemetry: Arc::new(TracingSink),
//!     };
//!     let manager = VerificationManager::new(KeygateConfig::default(), backends)?;
//!
//!     let verdict = manager.verify(&VerifyRequest::new("API-KEY-HERE", "app-id")).await?;
//!     println!("status {}", verdict.status_code());
//!     Ok(())
//! }
//! ```
//!
//! ## Failure policy
//!
//! Policy outcomes (unknown, disabled, expired, rate limited, quota
//! exceeded, bad signature) are returned as [`Verdict::Reject`]. An
//! `Err(KeygateError)` means no decision could be made, for example because
//! counter storage was unavailable; callers should answer with a 5xx.

#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/keygate/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Credentials and policy
pub mod credential;
pub mod policy;
pub mod verdict;

// Crypto layer
pub mod crypto;

// Storage and actors
pub mod actor;
pub mod store;

// External collaborators
pub mod directory;
pub mod keysource;
pub mod telemetry;

// Wire protocol of the actors
pub mod protocol;

// Manager (main public API)
pub mod manager;

// Re-exports for public API
pub use actor::{Outcome, QuotaActor, RateLimiterActor, WindowCounter};
pub use clock::{Clock, SystemClock};
pub use config::KeygateConfig;
pub use credential::generate::generate_api_key;
pub use credential::hash::CredentialHash;
pub use directory::{
    CredentialDirectory, CredentialMetadata, CredentialRecord, KeyIdentity, MemoryDirectory,
};
pub use errors::KeygateError;
pub use keysource::{HttpKeySource, Jwk, KeySource, MemoryKeySource};
pub use manager::{Backends, VerificationManager, VerifyRequest};
pub use policy::RateLimitPolicy;
pub use store::{CounterStore, FileCounterStore, MemoryCounterStore};
pub use telemetry::{MemorySink, RequestTelemetry, TelemetrySink, TracingSink, UsageEvent};
pub use verdict::{Acceptance, RateLimitStatus, RejectReason, Rejection, Verdict};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
