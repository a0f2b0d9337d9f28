//! Opaque API key generation.

use crate::KeygateError;
use rand::{rngs::OsRng, RngCore};
use std::ops::RangeInclusive;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Allowed key lengths, in characters.
pub const KEY_LENGTH_RANGE: RangeInclusive<usize> = 16..=128;

/// Generate an opaque API key of `byte_length` alphanumeric characters.
///
/// Each character is drawn from one byte of OS randomness.
pub fn generate_api_key(byte_length: usize) -> Result<String, KeygateError> {
    if !KEY_LENGTH_RANGE.contains(&byte_length) {
        return Err(KeygateError::ConfigError(format!(
            "byte_length must be within {}..={}, got {}",
            KEY_LENGTH_RANGE.start(),
            KEY_LENGTH_RANGE.end(),
            byte_length
        )));
    }

    let mut bytes = vec![0u8; byte_length];
    OsRng.fill_bytes(&mut bytes);

    Ok(bytes
        .iter()
        .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::is_signed_token;

    #[test]
    fn generated_key_has_requested_length() {
        let key = generate_api_key(32).unwrap();
        assert_eq!(key.len(), 32);
        assert!(key.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(generate_api_key(24).unwrap(), generate_api_key(24).unwrap());
    }

    #[test]
    fn generated_key_is_opaque() {
        assert!(!is_signed_token(&generate_api_key(16).unwrap()));
    }

    #[test]
    fn length_bounds_enforced() {
        assert!(matches!(generate_api_key(15), Err(KeygateError::ConfigError(_))));
        assert!(matches!(generate_api_key(129), Err(KeygateError::ConfigError(_))));
        assert!(generate_api_key(128).is_ok());
    }
}
