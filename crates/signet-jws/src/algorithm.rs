//! Signature algorithm identifiers
//!
//! The closed set of RFC 7518 signature algorithms plus the RFC 7515
//! unsecured form. Anything outside this set fails at header parse time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Signature algorithms accepted in the `alg` header parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// HMAC with SHA-256
    #[serde(rename = "HS256")]
    HS256,
    /// HMAC with SHA-384
    #[serde(rename = "HS384")]
    HS384,
    /// HMAC with SHA-512
    #[serde(rename = "HS512")]
    HS512,
    /// RSA PKCS#1 v1.5 with SHA-256
    #[serde(rename = "RS256")]
    RS256,
    /// RSA PKCS#1 v1.5 with SHA-384
    #[serde(rename = "RS384")]
    RS384,
    /// RSA PKCS#1 v1.5 with SHA-512
    #[serde(rename = "RS512")]
    RS512,
    /// RSA-PSS with SHA-256, MGF1-SHA-256, salt length 32
    #[serde(rename = "PS256")]
    PS256,
    /// RSA-PSS with SHA-384, MGF1-SHA-384, salt length 48
    #[serde(rename = "PS384")]
    PS384,
    /// RSA-PSS with SHA-512, MGF1-SHA-512, salt length 64
    #[serde(rename = "PS512")]
    PS512,
    /// ECDSA on P-256 with SHA-256
    #[serde(rename = "ES256")]
    ES256,
    /// ECDSA on P-384 with SHA-384
    #[serde(rename = "ES384")]
    ES384,
    /// ECDSA on P-521 with SHA-512
    #[serde(rename = "ES512")]
    ES512,
    /// Ed25519
    #[serde(rename = "EdDSA")]
    EdDSA,
    /// Unsecured: no signature is produced or expected
    #[serde(rename = "none")]
    NoSignature,
}

impl SignatureAlgorithm {
    /// The RFC 7518 name of the algorithm
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
            Self::EdDSA => "EdDSA",
            Self::NoSignature => "none",
        }
    }

    /// Whether this is the unsecured `none` algorithm
    pub fn is_unsecured(self) -> bool {
        matches!(self, Self::NoSignature)
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "PS256" => Ok(Self::PS256),
            "PS384" => Ok(Self::PS384),
            "PS512" => Ok(Self::PS512),
            "ES256" => Ok(Self::ES256),
            "ES384" => Ok(Self::ES384),
            "ES512" => Ok(Self::ES512),
            "EdDSA" => Ok(Self::EdDSA),
            "none" => Ok(Self::NoSignature),
            other => Err(EnvelopeError::UnknownAlgorithm {
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for alg in [
            SignatureAlgorithm::HS256,
            SignatureAlgorithm::HS384,
            SignatureAlgorithm::HS512,
            SignatureAlgorithm::RS256,
            SignatureAlgorithm::RS384,
            SignatureAlgorithm::RS512,
            SignatureAlgorithm::PS256,
            SignatureAlgorithm::PS384,
            SignatureAlgorithm::PS512,
            SignatureAlgorithm::ES256,
            SignatureAlgorithm::ES384,
            SignatureAlgorithm::ES512,
            SignatureAlgorithm::EdDSA,
            SignatureAlgorithm::NoSignature,
        ] {
            assert_eq!(alg.as_str().parse::<SignatureAlgorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let err = "HS1024".parse::<SignatureAlgorithm>().unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::UnknownAlgorithm { value } if value == "HS1024"
        ));
    }

    #[test]
    fn test_serde_uses_rfc_names() {
        let json = serde_json::to_string(&SignatureAlgorithm::NoSignature).unwrap();
        assert_eq!(json, r#""none""#);
        let alg: SignatureAlgorithm = serde_json::from_str(r#""EdDSA""#).unwrap();
        assert_eq!(alg, SignatureAlgorithm::EdDSA);
    }
}
