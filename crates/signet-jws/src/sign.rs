//! Signing suite
//!
//! Polymorphism over signature algorithms is expressed as the tagged
//! [`KeyMaterial`] variant plus the object-safe [`EnvelopeSigner`] trait.
//! [`SignatureKey`] pairs an algorithm with compatible key material (checked
//! at construction) and an optional key identifier that the encoder copies
//! into the protected headers.
//!
//! ECDSA signatures use the fixed-width `r || s` encoding (64/96/132 bytes
//! for P-256/P-384/P-521), not ASN.1 DER. RSA-PSS uses MGF1 with the digest
//! hash and a salt as long as the hash output. HMAC tags are compared in
//! constant time.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use signature::{RandomizedSigner, Signer as _, Verifier as _};

use crate::algorithm::SignatureAlgorithm;
use crate::error::{EnvelopeError, Result};

/// Capability to produce and check raw signature bytes for a signing input
pub trait EnvelopeSigner: Send + Sync {
    /// Algorithm this signer produces and accepts
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Key identifier to stamp into protected headers, if any
    fn key_id(&self) -> Option<&str> {
        None
    }

    /// Produce raw signature bytes over `input`
    fn sign(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Check `signature` against `input`
    fn verify(&self, input: &[u8], signature: &[u8]) -> Result<()>;
}

/// Key material for one signature algorithm family
///
/// Asymmetric variants hold an optional private half so a suite built from a
/// public key alone can still verify.
pub enum KeyMaterial {
    /// Symmetric secret for the HS* family
    Hmac {
        /// Raw shared secret
        secret: Vec<u8>,
    },
    /// RSA key pair for the RS*/PS* families
    Rsa {
        /// Private key, when signing capability is needed
        private: Option<rsa::RsaPrivateKey>,
        /// Public key
        public: rsa::RsaPublicKey,
    },
    /// P-256 key pair for ES256
    EcdsaP256 {
        /// Private key, when signing capability is needed
        private: Option<p256::ecdsa::SigningKey>,
        /// Public key
        public: p256::ecdsa::VerifyingKey,
    },
    /// P-384 key pair for ES384
    EcdsaP384 {
        /// Private key, when signing capability is needed
        private: Option<p384::ecdsa::SigningKey>,
        /// Public key
        public: p384::ecdsa::VerifyingKey,
    },
    /// P-521 key pair for ES512
    EcdsaP521 {
        /// Private key, when signing capability is needed
        private: Option<p521::ecdsa::SigningKey>,
        /// Public key
        public: p521::ecdsa::VerifyingKey,
    },
    /// Ed25519 key pair for EdDSA
    Ed25519 {
        /// Private key, when signing capability is needed
        private: Option<ed25519_dalek::SigningKey>,
        /// Public key
        public: ed25519_dalek::VerifyingKey,
    },
    /// No key material; only valid for the unsecured algorithm
    None,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes never appear in logs
        let variant = match self {
            Self::Hmac { .. } => "Hmac",
            Self::Rsa { .. } => "Rsa",
            Self::EcdsaP256 { .. } => "EcdsaP256",
            Self::EcdsaP384 { .. } => "EcdsaP384",
            Self::EcdsaP521 { .. } => "EcdsaP521",
            Self::Ed25519 { .. } => "Ed25519",
            Self::None => "None",
        };
        f.debug_struct("KeyMaterial").field("kind", &variant).finish()
    }
}

/// An algorithm bound to compatible key material
#[derive(Debug)]
pub struct SignatureKey {
    algorithm: SignatureAlgorithm,
    material: KeyMaterial,
    key_id: Option<String>,
}

impl SignatureKey {
    /// Bind an algorithm to key material, rejecting incompatible pairings
    pub fn new(algorithm: SignatureAlgorithm, material: KeyMaterial) -> Result<Self> {
        use SignatureAlgorithm::*;
        let compatible = matches!(
            (algorithm, &material),
            (HS256 | HS384 | HS512, KeyMaterial::Hmac { .. })
                | (RS256 | RS384 | RS512 | PS256 | PS384 | PS512, KeyMaterial::Rsa { .. })
                | (ES256, KeyMaterial::EcdsaP256 { .. })
                | (ES384, KeyMaterial::EcdsaP384 { .. })
                | (ES512, KeyMaterial::EcdsaP521 { .. })
                | (EdDSA, KeyMaterial::Ed25519 { .. })
                | (NoSignature, KeyMaterial::None)
        );
        if !compatible {
            return Err(EnvelopeError::Crypto {
                reason: format!("key material is not usable with algorithm {algorithm}"),
            });
        }
        if let KeyMaterial::Hmac { secret } = &material {
            if secret.is_empty() {
                return Err(EnvelopeError::Crypto {
                    reason: "HMAC secret must not be empty".to_string(),
                });
            }
        }
        Ok(Self {
            algorithm,
            material,
            key_id: None,
        })
    }

    /// HMAC suite over a shared secret; `algorithm` must be HS256/384/512
    pub fn hmac(algorithm: SignatureAlgorithm, secret: impl Into<Vec<u8>>) -> Result<Self> {
        Self::new(
            algorithm,
            KeyMaterial::Hmac {
                secret: secret.into(),
            },
        )
    }

    /// RSA suite with signing capability; `algorithm` must be RS* or PS*
    pub fn rsa(algorithm: SignatureAlgorithm, private_key: rsa::RsaPrivateKey) -> Result<Self> {
        let public = private_key.to_public_key();
        Self::new(
            algorithm,
            KeyMaterial::Rsa {
                private: Some(private_key),
                public,
            },
        )
    }

    /// Verify-only RSA suite
    pub fn rsa_verifier(
        algorithm: SignatureAlgorithm,
        public_key: rsa::RsaPublicKey,
    ) -> Result<Self> {
        Self::new(
            algorithm,
            KeyMaterial::Rsa {
                private: None,
                public: public_key,
            },
        )
    }

    /// ES256 suite with signing capability
    pub fn es256(private_key: p256::ecdsa::SigningKey) -> Self {
        let public = *private_key.verifying_key();
        Self {
            algorithm: SignatureAlgorithm::ES256,
            material: KeyMaterial::EcdsaP256 {
                private: Some(private_key),
                public,
            },
            key_id: None,
        }
    }

    /// Verify-only ES256 suite
    pub fn es256_verifier(public_key: p256::ecdsa::VerifyingKey) -> Self {
        Self {
            algorithm: SignatureAlgorithm::ES256,
            material: KeyMaterial::EcdsaP256 {
                private: None,
                public: public_key,
            },
            key_id: None,
        }
    }

    /// ES384 suite with signing capability
    pub fn es384(private_key: p384::ecdsa::SigningKey) -> Self {
        let public = *private_key.verifying_key();
        Self {
            algorithm: SignatureAlgorithm::ES384,
            material: KeyMaterial::EcdsaP384 {
                private: Some(private_key),
                public,
            },
            key_id: None,
        }
    }

    /// ES512 suite with signing capability
    pub fn es512(private_key: p521::ecdsa::SigningKey) -> Self {
        let public = p521::ecdsa::VerifyingKey::from(&private_key);
        Self {
            algorithm: SignatureAlgorithm::ES512,
            material: KeyMaterial::EcdsaP521 {
                private: Some(private_key),
                public,
            },
            key_id: None,
        }
    }

    /// EdDSA suite with signing capability
    pub fn ed25519(private_key: ed25519_dalek::SigningKey) -> Self {
        let public = private_key.verifying_key();
        Self {
            algorithm: SignatureAlgorithm::EdDSA,
            material: KeyMaterial::Ed25519 {
                private: Some(private_key),
                public,
            },
            key_id: None,
        }
    }

    /// Verify-only EdDSA suite
    pub fn ed25519_verifier(public_key: ed25519_dalek::VerifyingKey) -> Self {
        Self {
            algorithm: SignatureAlgorithm::EdDSA,
            material: KeyMaterial::Ed25519 {
                private: None,
                public: public_key,
            },
            key_id: None,
        }
    }

    /// The unsecured suite: signs to empty, accepts only empty
    pub fn unsecured() -> Self {
        Self {
            algorithm: SignatureAlgorithm::NoSignature,
            material: KeyMaterial::None,
            key_id: None,
        }
    }

    /// Attach a key identifier; the encoder writes it as `kid`
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }
}

impl EnvelopeSigner for SignatureKey {
    fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>> {
        use SignatureAlgorithm::*;
        match (&self.material, self.algorithm) {
            (KeyMaterial::Hmac { secret }, HS256 | HS384 | HS512) => {
                hmac_sign(self.algorithm, secret, input)
            }
            (KeyMaterial::Rsa { private, .. }, RS256 | RS384 | RS512 | PS256 | PS384 | PS512) => {
                let key = require_private(private.as_ref())?;
                rsa_sign(self.algorithm, key, input)
            }
            (KeyMaterial::EcdsaP256 { private, .. }, ES256) => {
                let key = require_private(private.as_ref())?;
                let signature: p256::ecdsa::Signature = key.sign(input);
                Ok(signature.to_bytes().to_vec())
            }
            (KeyMaterial::EcdsaP384 { private, .. }, ES384) => {
                let key = require_private(private.as_ref())?;
                let signature: p384::ecdsa::Signature = key.sign(input);
                Ok(signature.to_bytes().to_vec())
            }
            (KeyMaterial::EcdsaP521 { private, .. }, ES512) => {
                let key = require_private(private.as_ref())?;
                let signature: p521::ecdsa::Signature = key.sign(input);
                Ok(signature.to_bytes().to_vec())
            }
            (KeyMaterial::Ed25519 { private, .. }, EdDSA) => {
                let key = require_private(private.as_ref())?;
                Ok(key.sign(input).to_bytes().to_vec())
            }
            (KeyMaterial::None, NoSignature) => Ok(Vec::new()),
            _ => Err(EnvelopeError::Crypto {
                reason: format!("key material is not usable with algorithm {}", self.algorithm),
            }),
        }
    }

    fn verify(&self, input: &[u8], signature: &[u8]) -> Result<()> {
        use SignatureAlgorithm::*;
        match (&self.material, self.algorithm) {
            (KeyMaterial::Hmac { secret }, HS256 | HS384 | HS512) => {
                hmac_verify(self.algorithm, secret, input, signature)
            }
            (KeyMaterial::Rsa { public, .. }, RS256 | RS384 | RS512 | PS256 | PS384 | PS512) => {
                rsa_verify(self.algorithm, public, input, signature)
            }
            (KeyMaterial::EcdsaP256 { public, .. }, ES256) => {
                let signature = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|err| verify_failed("malformed ES256 signature", err))?;
                public
                    .verify(input, &signature)
                    .map_err(|err| verify_failed("ES256", err))
            }
            (KeyMaterial::EcdsaP384 { public, .. }, ES384) => {
                let signature = p384::ecdsa::Signature::from_slice(signature)
                    .map_err(|err| verify_failed("malformed ES384 signature", err))?;
                public
                    .verify(input, &signature)
                    .map_err(|err| verify_failed("ES384", err))
            }
            (KeyMaterial::EcdsaP521 { public, .. }, ES512) => {
                let signature = p521::ecdsa::Signature::from_slice(signature)
                    .map_err(|err| verify_failed("malformed ES512 signature", err))?;
                public
                    .verify(input, &signature)
                    .map_err(|err| verify_failed("ES512", err))
            }
            (KeyMaterial::Ed25519 { public, .. }, EdDSA) => {
                let signature = ed25519_dalek::Signature::try_from(signature)
                    .map_err(|err| verify_failed("malformed EdDSA signature", err))?;
                public
                    .verify(input, &signature)
                    .map_err(|err| verify_failed("EdDSA", err))
            }
            (KeyMaterial::None, NoSignature) => {
                if signature.is_empty() {
                    Ok(())
                } else {
                    Err(EnvelopeError::VerifyFailed {
                        reason: "unsecured envelope must carry an empty signature".to_string(),
                    })
                }
            }
            _ => Err(EnvelopeError::Crypto {
                reason: format!("key material is not usable with algorithm {}", self.algorithm),
            }),
        }
    }
}

fn require_private<K>(private: Option<&K>) -> Result<&K> {
    private.ok_or_else(|| EnvelopeError::Crypto {
        reason: "signing requires a private key".to_string(),
    })
}

fn verify_failed(context: &str, err: impl std::fmt::Display) -> EnvelopeError {
    EnvelopeError::VerifyFailed {
        reason: format!("{context}: {err}"),
    }
}

fn crypto_error(context: &str, err: impl std::fmt::Display) -> EnvelopeError {
    EnvelopeError::Crypto {
        reason: format!("{context}: {err}"),
    }
}

fn hmac_sign(algorithm: SignatureAlgorithm, secret: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        SignatureAlgorithm::HS256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                .map_err(|err| crypto_error("HMAC key", err))?;
            mac.update(input);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        SignatureAlgorithm::HS384 => {
            let mut mac = Hmac::<Sha384>::new_from_slice(secret)
                .map_err(|err| crypto_error("HMAC key", err))?;
            mac.update(input);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        SignatureAlgorithm::HS512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret)
                .map_err(|err| crypto_error("HMAC key", err))?;
            mac.update(input);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        other => Err(EnvelopeError::Crypto {
            reason: format!("{other} is not an HMAC algorithm"),
        }),
    }
}

fn hmac_verify(
    algorithm: SignatureAlgorithm,
    secret: &[u8],
    input: &[u8],
    signature: &[u8],
) -> Result<()> {
    // verify_slice compares in constant time
    match algorithm {
        SignatureAlgorithm::HS256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                .map_err(|err| crypto_error("HMAC key", err))?;
            mac.update(input);
            mac.verify_slice(signature)
                .map_err(|err| verify_failed("HS256", err))
        }
        SignatureAlgorithm::HS384 => {
            let mut mac = Hmac::<Sha384>::new_from_slice(secret)
                .map_err(|err| crypto_error("HMAC key", err))?;
            mac.update(input);
            mac.verify_slice(signature)
                .map_err(|err| verify_failed("HS384", err))
        }
        SignatureAlgorithm::HS512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret)
                .map_err(|err| crypto_error("HMAC key", err))?;
            mac.update(input);
            mac.verify_slice(signature)
                .map_err(|err| verify_failed("HS512", err))
        }
        other => Err(EnvelopeError::Crypto {
            reason: format!("{other} is not an HMAC algorithm"),
        }),
    }
}

fn rsa_sign(
    algorithm: SignatureAlgorithm,
    key: &rsa::RsaPrivateKey,
    input: &[u8],
) -> Result<Vec<u8>> {
    use signature::SignatureEncoding;
    match algorithm {
        SignatureAlgorithm::RS256 => {
            let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
            let signature = signing_key
                .try_sign(input)
                .map_err(|err| crypto_error("RS256 signing", err))?;
            Ok(signature.to_bytes().to_vec())
        }
        SignatureAlgorithm::RS384 => {
            let signing_key = rsa::pkcs1v15::SigningKey::<Sha384>::new(key.clone());
            let signature = signing_key
                .try_sign(input)
                .map_err(|err| crypto_error("RS384 signing", err))?;
            Ok(signature.to_bytes().to_vec())
        }
        SignatureAlgorithm::RS512 => {
            let signing_key = rsa::pkcs1v15::SigningKey::<Sha512>::new(key.clone());
            let signature = signing_key
                .try_sign(input)
                .map_err(|err| crypto_error("RS512 signing", err))?;
            Ok(signature.to_bytes().to_vec())
        }
        SignatureAlgorithm::PS256 => {
            let mut rng = rand::thread_rng();
            let signing_key = rsa::pss::BlindedSigningKey::<Sha256>::new(key.clone());
            let signature = signing_key.sign_with_rng(&mut rng, input);
            Ok(signature.to_bytes().to_vec())
        }
        SignatureAlgorithm::PS384 => {
            let mut rng = rand::thread_rng();
            let signing_key = rsa::pss::BlindedSigningKey::<Sha384>::new(key.clone());
            let signature = signing_key.sign_with_rng(&mut rng, input);
            Ok(signature.to_bytes().to_vec())
        }
        SignatureAlgorithm::PS512 => {
            let mut rng = rand::thread_rng();
            let signing_key = rsa::pss::BlindedSigningKey::<Sha512>::new(key.clone());
            let signature = signing_key.sign_with_rng(&mut rng, input);
            Ok(signature.to_bytes().to_vec())
        }
        other => Err(EnvelopeError::Crypto {
            reason: format!("{other} is not an RSA algorithm"),
        }),
    }
}

fn rsa_verify(
    algorithm: SignatureAlgorithm,
    public: &rsa::RsaPublicKey,
    input: &[u8],
    signature: &[u8],
) -> Result<()> {
    match algorithm {
        SignatureAlgorithm::RS256 => {
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public.clone());
            let signature = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|err| verify_failed("malformed RS256 signature", err))?;
            verifying_key
                .verify(input, &signature)
                .map_err(|err| verify_failed("RS256", err))
        }
        SignatureAlgorithm::RS384 => {
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha384>::new(public.clone());
            let signature = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|err| verify_failed("malformed RS384 signature", err))?;
            verifying_key
                .verify(input, &signature)
                .map_err(|err| verify_failed("RS384", err))
        }
        SignatureAlgorithm::RS512 => {
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha512>::new(public.clone());
            let signature = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|err| verify_failed("malformed RS512 signature", err))?;
            verifying_key
                .verify(input, &signature)
                .map_err(|err| verify_failed("RS512", err))
        }
        SignatureAlgorithm::PS256 => {
            let verifying_key = rsa::pss::VerifyingKey::<Sha256>::new(public.clone());
            let signature = rsa::pss::Signature::try_from(signature)
                .map_err(|err| verify_failed("malformed PS256 signature", err))?;
            verifying_key
                .verify(input, &signature)
                .map_err(|err| verify_failed("PS256", err))
        }
        SignatureAlgorithm::PS384 => {
            let verifying_key = rsa::pss::VerifyingKey::<Sha384>::new(public.clone());
            let signature = rsa::pss::Signature::try_from(signature)
                .map_err(|err| verify_failed("malformed PS384 signature", err))?;
            verifying_key
                .verify(input, &signature)
                .map_err(|err| verify_failed("PS384", err))
        }
        SignatureAlgorithm::PS512 => {
            let verifying_key = rsa::pss::VerifyingKey::<Sha512>::new(public.clone());
            let signature = rsa::pss::Signature::try_from(signature)
                .map_err(|err| verify_failed("malformed PS512 signature", err))?;
            verifying_key
                .verify(input, &signature)
                .map_err(|err| verify_failed("PS512", err))
        }
        other => Err(EnvelopeError::Crypto {
            reason: format!("{other} is not an RSA algorithm"),
        }),
    }
}
