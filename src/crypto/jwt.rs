//! Compact-serialized signed tokens verified against JSON Web Keys.
//!
//! The algorithm is taken from each key (`kty`, then `alg`), never from the
//! token header. A token whose header names another algorithm does not
//! verify under that key. Supported keys:
//!
//! | `kty` | algorithms |
//! |-------|------------|
//! | `RSA` | RS256 (default), RS384, RS512 |
//! | `EC`  | ES256 (default), ES384 |
//! | `OKP` | EdDSA (`crv` Ed25519) |

use crate::keysource::Jwk;
use crate::KeygateError;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Registered time claims. Other claims are kept but not interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Not-before, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Remaining claims.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn required<'a>(field: &'a Option<String>, name: &str, kty: &str) -> Result<&'a str, KeygateError> {
    field
        .as_deref()
        .ok_or_else(|| KeygateError::ProtocolError(format!("{} JWK is missing '{}'", kty, name)))
}

fn invalid_key(kty: &str, e: jsonwebtoken::errors::Error) -> KeygateError {
    KeygateError::ProtocolError(format!("Invalid {} JWK: {}", kty, e))
}

/// Build a decoding key and the algorithm it verifies from a JWK.
pub fn decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), KeygateError> {
    let kty = jwk.kty.as_str();
    match kty {
        "RSA" => {
            let n = required(&jwk.n, "n", kty)?;
            let e = required(&jwk.e, "e", kty)?;
            let key = DecodingKey::from_rsa_components(n, e).map_err(|err| invalid_key(kty, err))?;
            let alg = match jwk.alg.as_deref() {
                Some("RS384") => Algorithm::RS384,
                Some("RS512") => Algorithm::RS512,
                _ => Algorithm::RS256,
            };
            Ok((key, alg))
        }
        "EC" => {
            let x = required(&jwk.x, "x", kty)?;
            let y = required(&jwk.y, "y", kty)?;
            let key = DecodingKey::from_ec_components(x, y).map_err(|err| invalid_key(kty, err))?;
            let alg = match (jwk.alg.as_deref(), jwk.crv.as_deref()) {
                (Some("ES384"), _) | (None, Some("P-384")) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };
            Ok((key, alg))
        }
        "OKP" => {
            if jwk.crv.as_deref() != Some("Ed25519") {
                return Err(KeygateError::ProtocolError(format!(
                    "Unsupported OKP curve: {}",
                    jwk.crv.as_deref().unwrap_or("none")
                )));
            }
            let x = required(&jwk.x, "x", kty)?;
            let key = DecodingKey::from_ed_components(x).map_err(|err| invalid_key(kty, err))?;
            Ok((key, Algorithm::EdDSA))
        }
        other => Err(KeygateError::ProtocolError(format!(
            "Unsupported key type: {}",
            other
        ))),
    }
}

/// Check `exp` and `nbf` against `now_secs`, allowing `leeway_secs` of skew.
fn check_times(claims: &Claims, now_secs: i64, leeway_secs: i64) -> Result<(), KeygateError> {
    if let Some(exp) = claims.exp {
        if now_secs > exp.saturating_add(leeway_secs) {
            return Err(KeygateError::SignatureInvalid);
        }
    }
    if let Some(nbf) = claims.nbf {
        if now_secs < nbf.saturating_sub(leeway_secs) {
            return Err(KeygateError::SignatureInvalid);
        }
    }
    Ok(())
}

/// Verify `token` against `keys` and return its claims.
///
/// With a header `kid`, keys carrying a different `kid` are skipped, as are
/// keys that cannot be decoded. The first key that verifies the signature
/// decides; its claims must then be current at `now_secs`. Every failure is
/// `SignatureInvalid`.
pub fn verify_token(
    token: &str,
    keys: &[Jwk],
    now_secs: i64,
    leeway_secs: i64,
) -> Result<Claims, KeygateError> {
    let header = decode_header(token).map_err(|_| KeygateError::SignatureInvalid)?;

    let candidates = keys.iter().filter(|jwk| match (&header.kid, &jwk.kid) {
        (Some(wanted), Some(kid)) => wanted == kid,
        _ => true,
    });

    for jwk in candidates {
        let (key, algorithm) = match decoding_key(jwk) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(kid = ?jwk.kid, error = %e, "skipping unusable verification key");
                continue;
            }
        };

        // Time claims are checked against the injected clock below.
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        if let Ok(data) = decode::<Claims>(token, &key, &validation) {
            check_times(&data.claims, now_secs, leeway_secs)?;
            return Ok(data.claims);
        }
    }

    Err(KeygateError::SignatureInvalid)
}
