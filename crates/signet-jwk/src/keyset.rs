//! Verification key sets
//!
//! A deliberately thin data model: the registry only needs to parse a key
//! set from a response body and let consumers pick keys by identifier. Key
//! material interpretation (building actual verifiers) is the caller's
//! concern.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RegistryError, Result};

/// One verification key
///
/// Only the parameters the registry itself reasons about are typed;
/// algorithm-specific parameters (`n`/`e`, `crv`/`x`/`y`, `k`, ...) pass
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC, OKP, oct)
    pub kty: String,

    /// Key identifier, used for key selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Public key use (sig, enc)
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Intended algorithm (RS256, ES256, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Remaining key parameters, passed through verbatim
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// A set of verification keys as served by a key-set endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeySet {
    /// The keys, in document order
    pub keys: Vec<Jwk>,
}

impl KeySet {
    /// Parse a key set from a response body
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|err| RegistryError::ParseFailed {
            reason: err.to_string(),
        })
    }

    /// The keys, in document order
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Number of keys in the set
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// First key whose `kid` equals `key_id`
    pub fn lookup_key_id(&self, key_id: &str) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|key| key.kid.as_deref() == Some(key_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = br#"{
        "keys": [
            {"kty": "RSA", "kid": "rsa-1", "use": "sig", "alg": "RS256", "n": "abc", "e": "AQAB"},
            {"kty": "EC", "kid": "ec-1", "crv": "P-256", "x": "xx", "y": "yy"}
        ]
    }"#;

    #[test]
    fn test_parse_and_lookup() {
        let set = KeySet::parse(SAMPLE).unwrap();
        assert_eq!(set.len(), 2);

        let rsa = set.lookup_key_id("rsa-1").unwrap();
        assert_eq!(rsa.kty, "RSA");
        assert_eq!(rsa.key_use.as_deref(), Some("sig"));
        assert_eq!(rsa.params.get("n").and_then(|v| v.as_str()), Some("abc"));

        assert!(set.lookup_key_id("missing").is_none());
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        let err = KeySet::parse(b"not json at all").unwrap_err();
        assert!(matches!(err, RegistryError::ParseFailed { .. }));
    }

    #[test]
    fn test_keys_without_kid_are_kept() {
        let set = KeySet::parse(br#"{"keys":[{"kty":"oct","k":"c2VjcmV0"}]}"#).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.keys()[0].kid.is_none());
    }
}
