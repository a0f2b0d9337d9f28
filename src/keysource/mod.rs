//! Verification key sources for signed-token credentials.

pub mod http;
pub mod memory;

use crate::KeygateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpKeySource;
pub use memory::MemoryKeySource;

/// A JSON Web Key.
///
/// Which of the key components are set depends on `kty`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type: `RSA`, `EC` or `OKP`.
    pub kty: String,
    /// Curve name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// Base64url x coordinate, or the Ed25519 public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// Base64url y coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// Base64url RSA modulus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// Base64url RSA public exponent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Key id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Intended algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
}

impl Jwk {
    /// Build an Ed25519 key from raw public key bytes.
    pub fn ed25519(public_key: &[u8; 32], kid: Option<&str>) -> Self {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        Self {
            kty: "OKP".to_string(),
            crv: Some("Ed25519".to_string()),
            x: Some(URL_SAFE_NO_PAD.encode(public_key)),
            kid: kid.map(String::from),
            alg: Some("EdDSA".to_string()),
            ..Default::default()
        }
    }
}

/// A JWKS document: `{"keys": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// The keys.
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

/// Resolves the verification keys of an application.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Keys for `application_id`. `Ok(None)` means the application has none.
    async fn verification_keys(
        &self,
        application_id: &str,
    ) -> Result<Option<Vec<Jwk>>, KeygateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jwks_document() {
        let json = r#"{"keys":[
            {"kty":"OKP","crv":"Ed25519","kid":"k1",
             "x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"},
            {"kty":"EC","crv":"P-256","x":"EoC3","y":"Y3VC","alg":"ES256","use":"sig"},
            {"kty":"RSA","n":"30ib","e":"AQAB","kid":"r1"}
        ]}"#;
        let set: JwkSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.keys.len(), 3);
        assert_eq!(set.keys[0].kid.as_deref(), Some("k1"));
        assert_eq!(set.keys[1].y.as_deref(), Some("Y3VC"));
        assert_eq!(set.keys[2].n.as_deref(), Some("30ib"));
        assert_eq!(set.keys[2].e.as_deref(), Some("AQAB"));
    }

    #[test]
    fn ed25519_constructor_encodes_base64url() {
        let key = Jwk::ed25519(&[0u8; 32], Some("k1"));
        assert_eq!(key.kty, "OKP");
        assert_eq!(key.x.as_deref(), Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"));
        assert!(key.y.is_none());
    }
}
