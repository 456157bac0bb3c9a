//! Envelope error taxonomy
//!
//! A single error type covers every failure the codec, header handling, and
//! signing suite can surface. Decode failures are precise about which part of
//! the wire form was rejected so callers can distinguish transport corruption
//! from structural violations.

use thiserror::Error;

use crate::algorithm::SignatureAlgorithm;

/// Result type alias for envelope operations
pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// Errors produced while encoding, decoding, signing, or verifying envelopes
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Compact serialization did not consist of exactly three segments
    #[error("compact serialization must have exactly 3 parts, got {count}")]
    InvalidCompactPartsCount {
        /// Number of `.`-separated segments observed
        count: usize,
    },

    /// A segment or field failed base64url decoding
    #[error("base64url decoding of {segment} failed: {source}")]
    InvalidBase64 {
        /// Which part of the serialization was being decoded
        segment: &'static str,
        /// Underlying decode error
        #[source]
        source: base64::DecodeError,
    },

    /// Header JSON was malformed or a registered parameter had the wrong type
    #[error("invalid header JSON: {reason}")]
    InvalidHeaderJson {
        /// What was wrong with the header material
        reason: String,
    },

    /// The envelope violated a structural invariant
    #[error("invalid envelope: {reason}")]
    InvalidEnvelope {
        /// Which invariant was violated
        reason: String,
    },

    /// No signature entry carried the verifier's algorithm
    #[error("no signature matches algorithm {algorithm}")]
    NoMatchingSignature {
        /// Algorithm the verifier offered
        algorithm: SignatureAlgorithm,
    },

    /// A signature was present but did not validate
    #[error("signature verification failed: {reason}")]
    VerifyFailed {
        /// Why verification failed
        reason: String,
    },

    /// An `alg` value outside the closed algorithm set
    #[error("unknown signature algorithm {value:?}")]
    UnknownAlgorithm {
        /// The unrecognized `alg` string
        value: String,
    },

    /// Key material was unusable for the requested operation
    #[error("cryptographic operation failed: {reason}")]
    Crypto {
        /// What the key material could not do
        reason: String,
    },
}
