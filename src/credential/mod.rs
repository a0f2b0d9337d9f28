//! Credential addressing and issuance helpers.

pub mod generate;
pub mod hash;

/// Whether a credential has the signed-token (JWT) shape.
///
/// Three non-empty segments of base64url characters separated by dots.
/// Opaque API keys are alphanumeric and never match.
pub fn is_signed_token(credential: &str) -> bool {
    let mut segments = 0;
    for segment in credential.split('.') {
        segments += 1;
        if segment.is_empty()
            || !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return false;
        }
    }
    segments == 3
}
