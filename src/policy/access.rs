//! Lifecycle and ownership checks.
//!
//! These checks enforce access based on:
//! - Ownership (the key must belong to the calling application)
//! - Lifecycle (the key must be active and unexpired)
//!
//! Both are pure functions of the directory record, so they run before any
//! counter is touched.

use crate::directory::{CredentialMetadata, KeyIdentity};
use crate::verdict::RejectReason;

/// Check that a credential belongs to `application_id`.
///
/// A mismatch is reported as `NotFound`, the same as an unknown key.
pub fn check_identity(identity: &KeyIdentity, application_id: &str) -> Result<(), RejectReason> {
    if identity.application_id != application_id {
        return Err(RejectReason::NotFound);
    }
    Ok(())
}

/// Check that a credential may be used at `now_ms`.
///
/// # Returns
/// * `Ok(())` - Active and unexpired
/// * `Err(Disabled)` - The key is inactive (checked first)
/// * `Err(Expired)` - The expiry is strictly before `now_ms`
pub fn check_lifecycle(metadata: &CredentialMetadata, now_ms: i64) -> Result<(), RejectReason> {
    // 1. Check the key is active
    if !metadata.active {
        return Err(RejectReason::Disabled);
    }

    // 2. Check expiry
    if let Some(expires_at_ms) = metadata.expires_at_ms {
        if expires_at_ms < now_ms {
            return Err(RejectReason::Expired);
        }
    }

    Ok(())
}
