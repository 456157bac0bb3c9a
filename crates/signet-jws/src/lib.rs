//! # signet-jws - signed token envelopes
//!
//! Producer and consumer for the two standard serializations of signed
//! payloads:
//!
//! - **Compact**: `BASE64URL(protected) "." BASE64URL(payload) "."
//!   BASE64URL(signature)` - one signature per token.
//! - **JSON**: flattened (one signature) or general (any number), with
//!   protected headers carried base64url-encoded and public headers as plain
//!   JSON objects.
//!
//! The codec preserves the exact protected-header bytes observed on decode
//! and uses them as the signing input during verification, so envelopes
//! survive non-canonical header JSON. Signing is polymorphic over the RFC
//! 7518 algorithm families (HMAC, RSA PKCS#1 v1.5, RSA-PSS, ECDSA, Ed25519,
//! and the unsecured `none` form) through [`SignatureKey`] or any custom
//! [`EnvelopeSigner`].
//!
//! ## Signing and verifying
//!
//! ```rust
//! use signet_jws::{Envelope, HeaderSet, SignatureAlgorithm, SignatureKey, sign_compact};
//!
//! # fn main() -> signet_jws::Result<()> {
//! let signer = SignatureKey::hmac(SignatureAlgorithm::HS256, b"a-shared-secret".to_vec())?
//!     .with_key_id("key-1");
//!
//! let mut headers = HeaderSet::new();
//! headers.set_typ("JWT");
//!
//! let token = sign_compact(&headers, b"hello world", &signer)?;
//! let envelope = Envelope::parse(token.as_bytes())?;
//! envelope.verify(&signer)?;
//! assert_eq!(envelope.payload(), b"hello world");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`algorithm`] - the closed `alg` set
//! - [`header`] - ordered header parameter sets
//! - [`sign`] - the signing suite and its trait seam
//! - [`envelope`] - the decoded value model and verification
//! - [`codec`] - wire-format encode/decode
//! - [`error`] - the failure taxonomy

pub mod algorithm;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod header;
pub mod sign;

pub use algorithm::SignatureAlgorithm;
pub use codec::{SignRequest, encode_compact, sign_compact, sign_multi};
pub use envelope::{Envelope, SignatureEntry};
pub use error::{EnvelopeError, Result};
pub use header::HeaderSet;
pub use sign::{EnvelopeSigner, KeyMaterial, SignatureKey};
