//! Envelope value model
//!
//! An [`Envelope`] is one payload carried with one or more signatures. Each
//! [`SignatureEntry`] keeps the exact base64url text of its protected header
//! as observed on the wire; that text, not a re-serialization, is the signing
//! input during verification, so envelopes with non-canonical header JSON
//! still verify.

use tracing::debug;

use crate::codec;
use crate::error::{EnvelopeError, Result};
use crate::header::HeaderSet;
use crate::sign::EnvelopeSigner;

/// One signature over the envelope payload
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureEntry {
    pub(crate) protected: Option<HeaderSet>,
    pub(crate) public: Option<HeaderSet>,
    pub(crate) signature: Vec<u8>,
    pub(crate) raw_protected: Option<String>,
}

impl SignatureEntry {
    /// Integrity-protected headers
    pub fn protected(&self) -> Option<&HeaderSet> {
        self.protected.as_ref()
    }

    /// Unprotected headers
    pub fn public(&self) -> Option<&HeaderSet> {
        self.public.as_ref()
    }

    /// Raw signature bytes
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Exact base64url text of the protected header as seen on the wire
    pub fn raw_protected(&self) -> Option<&str> {
        self.raw_protected.as_deref()
    }

    /// Union of public and protected headers, protected authoritative
    pub fn merged_headers(&self) -> HeaderSet {
        HeaderSet::merge(self.public.as_ref(), self.protected.as_ref())
    }

    fn matches_key_id(&self, key_id: &str) -> bool {
        let in_public = self
            .public
            .as_ref()
            .and_then(|headers| headers.key_id())
            .is_some_and(|kid| kid == key_id);
        let in_protected = self
            .protected
            .as_ref()
            .and_then(|headers| headers.key_id())
            .is_some_and(|kid| kid == key_id);
        in_public || in_protected
    }
}

/// A payload signed by one or more parties
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub(crate) payload: Vec<u8>,
    pub(crate) signatures: Vec<SignatureEntry>,
    pub(crate) b64: bool,
}

impl Envelope {
    /// The decoded payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether the payload travels base64url-encoded on the wire
    pub fn b64(&self) -> bool {
        self.b64
    }

    /// All signature entries, in wire order
    pub fn signatures(&self) -> &[SignatureEntry] {
        &self.signatures
    }

    /// All entries whose public or protected `kid` equals `key_id`
    pub fn lookup_signature(&self, key_id: &str) -> Vec<&SignatureEntry> {
        self.signatures
            .iter()
            .filter(|entry| entry.matches_key_id(key_id))
            .collect()
    }

    /// Parse either serialization, sniffing the format
    ///
    /// A document whose first non-whitespace byte is `{` is treated as the
    /// JSON serialization; anything else as compact.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let first = data.iter().find(|byte| !byte.is_ascii_whitespace());
        if first == Some(&b'{') {
            Self::from_json(data)
        } else {
            let text = std::str::from_utf8(data).map_err(|_| EnvelopeError::InvalidEnvelope {
                reason: "compact serialization must be valid UTF-8".to_string(),
            })?;
            Self::from_compact(text)
        }
    }

    /// Decode the three-segment compact serialization
    pub fn from_compact(text: &str) -> Result<Self> {
        codec::decode_compact(text)
    }

    /// Decode the flattened or general JSON serialization
    pub fn from_json(data: &[u8]) -> Result<Self> {
        codec::decode_json(data)
    }

    /// Encode as JSON: flattened for one signature, general otherwise
    pub fn to_json(&self) -> Result<String> {
        codec::encode_json(self)
    }

    /// Re-encode a single-signature envelope in compact form
    pub fn to_compact(&self) -> Result<String> {
        codec::encode_compact_from_envelope(self)
    }

    /// Verify the envelope against a signer
    ///
    /// Entries whose merged `alg` equals the signer's algorithm are tried in
    /// stored order; the first that validates wins. With no candidate entry
    /// the result is [`EnvelopeError::NoMatchingSignature`]; with candidates
    /// but no success, the last observed verification error.
    pub fn verify(&self, signer: &dyn EnvelopeSigner) -> Result<()> {
        let algorithm = signer.algorithm();
        let mut last_error = None;
        for entry in &self.signatures {
            if entry.merged_headers().algorithm() != Some(algorithm) {
                continue;
            }
            let input = codec::signing_input(
                entry.raw_protected().unwrap_or(""),
                &self.payload,
                self.b64,
            );
            match signer.verify(&input, &entry.signature) {
                Ok(()) => {
                    debug!(%algorithm, "envelope signature verified");
                    return Ok(());
                }
                Err(err) => last_error = Some(err),
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Err(EnvelopeError::NoMatchingSignature { algorithm }),
        }
    }
}
