//! Verification Manager - the main public API for Keygate.
//!
//! The `VerificationManager` runs the per-request decision pipeline:
//! - Signed-token signature check (when the credential is a token)
//! - Directory lookup, ownership and lifecycle checks
//! - Rate limit and quota consumption through the per-credential actors
//! - Usage telemetry for every decision

use crate::actor::{QuotaActor, RateLimiterActor, WindowCounter};
use crate::clock::{Clock, SystemClock};
use crate::config::KeygateConfig;
use crate::credential::hash::CredentialHash;
use crate::credential::is_signed_token;
use crate::crypto::jwt::verify_token;
use crate::directory::{CredentialDirectory, CredentialMetadata, KeyIdentity};
use crate::keysource::KeySource;
use crate::policy::access::{check_identity, check_lifecycle};
use crate::protocol::{handle_quota, handle_rate_limit, WireResponse};
use crate::store::CounterStore;
use crate::telemetry::{RequestTelemetry, TelemetryEmitter, TelemetrySink, UsageEvent};
use crate::verdict::{Acceptance, RateLimitStatus, RejectReason, Verdict};
use crate::KeygateError;
use std::sync::Arc;
use tracing::{debug, warn};

/// External collaborators of the manager.
#[derive(Clone)]
pub struct Backends {
    /// Credential records.
    pub directory: Arc<dyn CredentialDirectory>,
    /// Verification keys for signed tokens.
    pub keys: Arc<dyn KeySource>,
    /// Counter storage shared by both actors.
    pub counters: Arc<dyn CounterStore>,
    /// Usage event destination.
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// One inbound verification request.
#[derive(Debug, Clone, Default)]
pub struct VerifyRequest {
    /// The presented credential: an opaque key or a signed token.
    pub credential: String,
    /// The application the caller claims the credential belongs to.
    pub application_id: String,
    /// Optional caller metadata for usage telemetry.
    pub telemetry: Option<RequestTelemetry>,
}

impl VerifyRequest {
    /// Request without telemetry metadata.
    pub fn new(credential: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            application_id: application_id.into(),
            telemetry: None,
        }
    }

    /// Attach caller metadata.
    pub fn with_telemetry(mut self, telemetry: RequestTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

/// Main verification manager for Keygate.
///
/// Create one instance per process and share it; every method takes
/// `&self` and may run concurrently.
pub struct VerificationManager {
    config: KeygateConfig,
    clock: Arc<dyn Clock>,
    directory: Arc<dyn CredentialDirectory>,
    keys: Arc<dyn KeySource>,
    rate_limiter: RateLimiterActor,
    quota: QuotaActor,
    telemetry: TelemetryEmitter,
}

impl VerificationManager {
    /// Create a new verification manager.
    ///
    /// Uses the system clock. Must be called from within a tokio runtime,
    /// which hosts the counter actors and the telemetry writer.
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration validation fails or no tokio
    /// runtime is running.
    pub fn new(config: KeygateConfig, backends: Backends) -> Result<Self, KeygateError> {
        config.validate()?;
        Self::with_clock(config, backends, Arc::new(SystemClock))
    }

    /// Create a verification manager with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        config: KeygateConfig,
        backends: Backends,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeygateError> {
        config.validate()?;
        Self::with_clock(config, backends, clock)
    }

    fn with_clock(
        config: KeygateConfig,
        backends: Backends,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeygateError> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            KeygateError::ConfigError("VerificationManager requires a tokio runtime".to_string())
        })?;

        let rate_limiter = RateLimiterActor::new(
            backends.counters.clone(),
            clock.clone(),
            config.mailbox_capacity,
        );
        let quota = QuotaActor::new(backends.counters, config.mailbox_capacity);
        let telemetry = TelemetryEmitter::spawn(backends.telemetry, config.telemetry_capacity);

        Ok(Self {
            config,
            clock,
            directory: backends.directory,
            keys: backends.keys,
            rate_limiter,
            quota,
            telemetry,
        })
    }

    /// Verify a credential and consume its limits.
    ///
    /// Checks run in a fixed order and stop at the first rejection:
    /// 1. Signed-token signature (tokens only)
    /// 2. Directory lookup
    /// 3. Owning application
    /// 4. Active, then expiry
    /// 5. Rate limit (consumes one call)
    /// 6. Quota (consumes one use; disables the key when it reaches 0)
    ///
    /// A rejection is `Ok(Verdict::Reject(..))`.
    ///
    /// # Errors
    /// - `MissingCredential` - Empty credential
    /// - `UpstreamUnavailable` - Directory or key source unreachable
    /// - `StorageUnavailable` - Counter storage failed
    pub async fn verify(&self, request: &VerifyRequest) -> Result<Verdict, KeygateError> {
        if request.credential.is_empty() {
            return Err(KeygateError::MissingCredential);
        }

        let hash = CredentialHash::of(&request.credential);
        let telemetry = request.telemetry.as_ref();

        // 1. Signed tokens must verify before anything is looked up
        if is_signed_token(&request.credential)
            && !self
                .signature_valid(&request.credential, &request.application_id)
                .await?
        {
            debug!(key = hash.short(), reason = "invalid_signature", "credential rejected");
            return Ok(Verdict::reject(RejectReason::InvalidSignature));
        }

        // 2. Lookup
        let record = match self.directory.lookup(&request.credential).await? {
            Some(record) => record,
            None => {
                debug!(key = hash.short(), reason = "not_found", "credential rejected");
                self.telemetry.emit(UsageEvent::for_unknown_key(
                    &request.application_id,
                    telemetry,
                    self.clock.now_utc(),
                ));
                return Ok(Verdict::reject(RejectReason::NotFound));
            }
        };
        let identity = &record.identity;
        let metadata = &record.metadata;

        // 3-4. Ownership and lifecycle
        if let Err(reason) = check_identity(identity, &request.application_id)
            .and_then(|()| check_lifecycle(metadata, self.clock.now_millis()))
        {
            return Ok(self.reject(&hash, identity, telemetry, Verdict::reject(reason)));
        }

        // 5. Rate limit
        let mut rate_limit = None;
        if let Some(policy) = metadata.rate_limit {
            let outcome = self.rate_limiter.check_and_consume(&hash, policy).await?;
            if !outcome.allowed {
                let verdict = Verdict::exhausted(RejectReason::RateLimited);
                return Ok(self.reject(&hash, identity, telemetry, verdict));
            }
            rate_limit = Some(RateLimitStatus::new(policy, outcome.remaining));
        }

        // 6. Quota
        let mut quota_remaining = None;
        let mut enabled = true;
        if metadata.quota.is_some() {
            let outcome = match self.quota.check_and_consume(&hash).await? {
                Some(outcome) => outcome,
                None => {
                    let verdict = Verdict::reject(RejectReason::NotFound);
                    return Ok(self.reject(&hash, identity, telemetry, verdict));
                }
            };
            if !outcome.allowed {
                let verdict = Verdict::exhausted(RejectReason::QuotaExceeded);
                return Ok(self.reject(&hash, identity, telemetry, verdict));
            }
            if outcome.remaining == 0 {
                self.disable_exhausted(&request.credential, &hash).await;
                enabled = false;
            }
            quota_remaining = Some(outcome.remaining);
        }

        // 7. Accept
        self.record_usage(identity, true, telemetry);
        Ok(Verdict::Accept(Acceptance {
            rate_limit,
            quota_remaining,
            enabled,
        }))
    }

    async fn signature_valid(
        &self,
        token: &str,
        application_id: &str,
    ) -> Result<bool, KeygateError> {
        let keys = match self.keys.verification_keys(application_id).await? {
            Some(keys) => keys,
            None => return Ok(false),
        };
        let now = self.clock.now_utc().timestamp();
        let leeway = i64::try_from(self.config.token_leeway.as_secs()).unwrap_or(i64::MAX);
        Ok(verify_token(token, &keys, now, leeway).is_ok())
    }

    fn reject(
        &self,
        hash: &CredentialHash,
        identity: &KeyIdentity,
        telemetry: Option<&RequestTelemetry>,
        verdict: Verdict,
    ) -> Verdict {
        if let Some(reason) = verdict.reject_reason() {
            debug!(key = hash.short(), reason = reason.code(), "credential rejected");
        }
        self.record_usage(identity, false, telemetry);
        verdict
    }

    fn record_usage(
        &self,
        identity: &KeyIdentity,
        success: bool,
        telemetry: Option<&RequestTelemetry>,
    ) {
        self.telemetry.emit(UsageEvent::for_identity(
            identity,
            success,
            telemetry,
            self.clock.now_utc(),
        ));
    }

    /// Best-effort write-back of `active = false`. Never fails the request.
    async fn disable_exhausted(&self, credential: &str, hash: &CredentialHash) {
        let disable = self.directory.disable(credential);
        match tokio::time::timeout(self.config.writeback_timeout, disable).await {
            Ok(Ok(())) => debug!(key = hash.short(), "disabled key with exhausted quota"),
            Ok(Err(e)) => warn!(key = hash.short(), error = %e, "failed to disable exhausted key"),
            Err(_) => warn!(key = hash.short(), "timed out disabling exhausted key"),
        }
    }

    /// Seed the counters of a newly issued credential.
    ///
    /// Sets the quota to its configured value and opens a fresh rate-limit
    /// window. Limits the metadata does not configure are left untouched.
    pub async fn seed_counters(
        &self,
        credential: &str,
        metadata: &CredentialMetadata,
    ) -> Result<(), KeygateError> {
        let hash = CredentialHash::of(credential);
        if let Some(quota) = metadata.quota {
            self.quota.initialize(&hash, quota).await?;
        }
        if let Some(policy) = metadata.rate_limit {
            self.rate_limiter
                .initialize_fresh(&hash, policy.window_seconds)
                .await?;
        }
        Ok(())
    }

    /// Overwrite the remaining quota of a credential.
    ///
    /// Re-enabling a key disabled by exhaustion is up to the directory owner.
    pub async fn refill_quota(&self, credential: &str, remaining: u64) -> Result<(), KeygateError> {
        self.quota
            .initialize(&CredentialHash::of(credential), remaining)
            .await
    }

    /// Remaining quota of a credential, `None` when it has no quota counter.
    pub async fn quota_remaining(&self, credential: &str) -> Result<Option<u64>, KeygateError> {
        self.quota.peek(&CredentialHash::of(credential)).await
    }

    /// Stored rate-limit window of a credential.
    pub async fn rate_limit_snapshot(
        &self,
        credential: &str,
    ) -> Result<Option<WindowCounter>, KeygateError> {
        self.rate_limiter.peek(&CredentialHash::of(credential)).await
    }

    /// Wait until every usage event emitted so far reached the sink.
    pub async fn flush_telemetry(&self) -> Result<(), KeygateError> {
        self.telemetry.flush().await
    }

    /// Answer a rate limiter wire query. Policies come from the directory.
    pub async fn rate_limit_query(&self, query: &str) -> WireResponse {
        handle_rate_limit(&self.rate_limiter, self.directory.as_ref(), query).await
    }

    /// Answer a quota wire query.
    pub async fn quota_query(&self, query: &str) -> WireResponse {
        handle_quota(&self.quota, query).await
    }

    /// The rate limiter actor.
    pub fn rate_limiter(&self) -> &RateLimiterActor {
        &self.rate_limiter
    }

    /// The quota actor.
    pub fn quota(&self) -> &QuotaActor {
        &self.quota
    }

    /// Get the current configuration.
    pub fn config(&self) -> &KeygateConfig {
        &self.config
    }
}
