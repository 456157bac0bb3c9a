//! Compact and JSON serialization codec
//!
//! Encoders sign the header bytes they just serialized; decoders retain the
//! base64url header text they observed so verification never depends on JSON
//! canonicalization. Key order in emitted JSON is fixed (`header`, `payload`,
//! `protected`, `signatures`, `signature`) for stable output.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::envelope::{Envelope, SignatureEntry};
use crate::error::{EnvelopeError, Result};
use crate::header::HeaderSet;
use crate::sign::EnvelopeSigner;

/// One signer plus its headers, for multi-signature envelopes
pub struct SignRequest<'a> {
    /// Signer producing this entry's signature
    pub signer: &'a dyn EnvelopeSigner,
    /// Headers to integrity-protect (the encoder adds `alg` and `kid`)
    pub protected: Option<&'a HeaderSet>,
    /// Headers transmitted unprotected
    pub public: Option<&'a HeaderSet>,
}

/// Build the signing input `protected "." payload-part`
///
/// The payload part is base64url unless the `b64` convention disables it, in
/// which case the raw payload bytes are signed.
pub(crate) fn signing_input(raw_protected: &str, payload: &[u8], b64: bool) -> Vec<u8> {
    let mut input = Vec::with_capacity(raw_protected.len() + 1 + payload.len() * 4 / 3 + 4);
    input.extend_from_slice(raw_protected.as_bytes());
    input.push(b'.');
    if b64 {
        input.extend_from_slice(URL_SAFE_NO_PAD.encode(payload).as_bytes());
    } else {
        input.extend_from_slice(payload);
    }
    input
}

/// Sign `payload` under `headers` and emit the compact serialization
///
/// The headers become the protected header of the output; `alg` is set from
/// the signer, and `kid` is set when the signer carries a non-empty key
/// identifier.
pub fn sign_compact(
    headers: &HeaderSet,
    payload: &[u8],
    signer: &dyn EnvelopeSigner,
) -> Result<String> {
    let (entry, b64) = build_signed_entry(Some(headers), None, payload, signer)?;
    let raw_protected = entry
        .raw_protected()
        .unwrap_or_default()
        .to_string();
    compact_string(&raw_protected, payload, b64, entry.signature())
}

/// Sign `payload` using caller-supplied protected-header bytes, verbatim
///
/// The header JSON is validated (it must parse and carry only recognized
/// types) but serialized exactly as given, so signatures over non-canonical
/// header JSON reproduce byte-for-byte.
pub fn encode_compact(
    header_json: &[u8],
    payload: &[u8],
    signer: &dyn EnvelopeSigner,
) -> Result<String> {
    let headers = HeaderSet::from_json_slice(header_json)?;
    let raw_protected = URL_SAFE_NO_PAD.encode(header_json);
    let b64 = headers.b64().unwrap_or(true);
    let input = signing_input(&raw_protected, payload, b64);
    let signature = signer.sign(&input)?;
    compact_string(&raw_protected, payload, b64, &signature)
}

/// Sign `payload` once per request, yielding a multi-signature envelope
pub fn sign_multi(payload: &[u8], requests: &[SignRequest<'_>]) -> Result<Envelope> {
    if requests.is_empty() {
        return Err(EnvelopeError::InvalidEnvelope {
            reason: "at least one signer is required".to_string(),
        });
    }
    let mut b64: Option<bool> = None;
    let mut signatures = Vec::with_capacity(requests.len());
    for request in requests {
        let (entry, entry_b64) =
            build_signed_entry(request.protected, request.public, payload, request.signer)?;
        match b64 {
            None => b64 = Some(entry_b64),
            Some(previous) if previous != entry_b64 => {
                return Err(EnvelopeError::InvalidEnvelope {
                    reason: "\"b64\" must be identical across signatures".to_string(),
                });
            }
            _ => {}
        }
        signatures.push(entry);
    }
    Ok(Envelope {
        payload: payload.to_vec(),
        signatures,
        b64: b64.unwrap_or(true),
    })
}

/// Decode the three-segment compact serialization
pub(crate) fn decode_compact(text: &str) -> Result<Envelope> {
    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() != 3 {
        return Err(EnvelopeError::InvalidCompactPartsCount { count: parts.len() });
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(parts[0].as_bytes())
        .map_err(|source| EnvelopeError::InvalidBase64 {
            segment: "protected header",
            source,
        })?;
    let protected = HeaderSet::from_json_slice(&header_bytes)?;
    let Some(algorithm) = protected.algorithm() else {
        return Err(EnvelopeError::InvalidHeaderJson {
            reason: "protected header must carry \"alg\"".to_string(),
        });
    };

    let b64 = protected.b64().unwrap_or(true);
    let payload = if b64 {
        URL_SAFE_NO_PAD
            .decode(parts[1].as_bytes())
            .map_err(|source| EnvelopeError::InvalidBase64 {
                segment: "payload",
                source,
            })?
    } else {
        parts[1].as_bytes().to_vec()
    };

    let signature = URL_SAFE_NO_PAD
        .decode(parts[2].as_bytes())
        .map_err(|source| EnvelopeError::InvalidBase64 {
            segment: "signature",
            source,
        })?;
    if signature.is_empty() && !algorithm.is_unsecured() {
        return Err(EnvelopeError::InvalidEnvelope {
            reason: format!("empty signature is only allowed for \"none\", not {algorithm}"),
        });
    }

    debug!(%algorithm, b64, "decoded compact envelope");
    Ok(Envelope {
        payload,
        signatures: vec![SignatureEntry {
            protected: Some(protected),
            public: None,
            signature,
            raw_protected: Some(parts[0].to_string()),
        }],
        b64,
    })
}

#[derive(Deserialize)]
struct EnvelopeDoc {
    payload: String,
    #[serde(default)]
    signatures: Vec<RawEntry>,
    #[serde(default)]
    header: Option<Value>,
    #[serde(default)]
    protected: Option<String>,
    #[serde(default)]
    signature: Option<String>,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    header: Option<Value>,
    #[serde(default)]
    protected: Option<String>,
    #[serde(default)]
    signature: String,
}

/// Decode the flattened or general JSON serialization
pub(crate) fn decode_json(data: &[u8]) -> Result<Envelope> {
    let doc: EnvelopeDoc =
        serde_json::from_slice(data).map_err(|err| EnvelopeError::InvalidEnvelope {
            reason: format!("malformed JSON serialization: {err}"),
        })?;

    let mut raw_entries = doc.signatures;
    if let Some(signature) = doc.signature {
        if !raw_entries.is_empty() {
            return Err(EnvelopeError::InvalidEnvelope {
                reason: "\"signature\" and \"signatures\" cannot both be present".to_string(),
            });
        }
        raw_entries.push(RawEntry {
            header: doc.header,
            protected: doc.protected,
            signature,
        });
    }
    if raw_entries.is_empty() {
        return Err(EnvelopeError::InvalidEnvelope {
            reason: "at least one signature is required".to_string(),
        });
    }

    let mut b64: Option<bool> = None;
    let mut signatures = Vec::with_capacity(raw_entries.len());
    for (index, raw) in raw_entries.into_iter().enumerate() {
        let public = match raw.header {
            Some(value) => Some(HeaderSet::from_value(value)?),
            None => None,
        };
        let (protected, raw_protected) = match raw.protected {
            Some(text) if !text.is_empty() => {
                let bytes = URL_SAFE_NO_PAD.decode(text.as_bytes()).map_err(|source| {
                    EnvelopeError::InvalidBase64 {
                        segment: "protected header",
                        source,
                    }
                })?;
                (Some(HeaderSet::from_json_slice(&bytes)?), Some(text))
            }
            _ => (None, None),
        };

        // Only entries that carry a protected header take part in the b64
        // agreement; an entry without one neither sets nor contests it
        if let Some(headers) = &protected {
            let entry_b64 = headers.b64().unwrap_or(true);
            match b64 {
                None => b64 = Some(entry_b64),
                Some(previous) if previous != entry_b64 => {
                    return Err(EnvelopeError::InvalidEnvelope {
                        reason: "\"b64\" must be identical across signatures".to_string(),
                    });
                }
                _ => {}
            }
        }

        if raw.signature.is_empty() {
            return Err(EnvelopeError::InvalidEnvelope {
                reason: format!("\"signature\" must be non-empty for signature #{}", index + 1),
            });
        }
        let signature = URL_SAFE_NO_PAD.decode(raw.signature.as_bytes()).map_err(
            |source| EnvelopeError::InvalidBase64 {
                segment: "signature",
                source,
            },
        )?;

        signatures.push(SignatureEntry {
            protected,
            public,
            signature,
            raw_protected,
        });
    }

    let b64 = b64.unwrap_or(true);
    let payload = if b64 {
        if doc.payload.is_empty() {
            return Err(EnvelopeError::InvalidEnvelope {
                reason: "\"payload\" must be non-empty".to_string(),
            });
        }
        URL_SAFE_NO_PAD
            .decode(doc.payload.as_bytes())
            .map_err(|source| EnvelopeError::InvalidBase64 {
                segment: "payload",
                source,
            })?
    } else {
        doc.payload.into_bytes()
    };

    Ok(Envelope {
        payload,
        signatures,
        b64,
    })
}

#[derive(Serialize)]
struct FlattenedDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<Value>,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    protected: Option<String>,
    signature: String,
}

#[derive(Serialize)]
struct GeneralDoc {
    payload: String,
    signatures: Vec<EntryDoc>,
}

#[derive(Serialize)]
struct EntryDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protected: Option<String>,
    signature: String,
}

/// Encode as JSON: flattened for one signature, general otherwise
pub(crate) fn encode_json(envelope: &Envelope) -> Result<String> {
    if envelope.signatures.is_empty() {
        return Err(EnvelopeError::InvalidEnvelope {
            reason: "envelope has no signatures".to_string(),
        });
    }
    let payload = payload_text(&envelope.payload, envelope.b64)?;
    let mut entries = envelope
        .signatures
        .iter()
        .map(entry_doc)
        .collect::<Result<Vec<_>>>()?;

    let rendered = if entries.len() == 1 {
        let entry = entries.remove(0);
        serde_json::to_string(&FlattenedDoc {
            header: entry.header,
            payload,
            protected: entry.protected,
            signature: entry.signature,
        })
    } else {
        serde_json::to_string(&GeneralDoc {
            payload,
            signatures: entries,
        })
    };
    rendered.map_err(|err| EnvelopeError::InvalidEnvelope {
        reason: format!("JSON serialization failed: {err}"),
    })
}

/// Re-encode a single-signature envelope in compact form
pub(crate) fn encode_compact_from_envelope(envelope: &Envelope) -> Result<String> {
    if envelope.signatures.len() != 1 {
        return Err(EnvelopeError::InvalidEnvelope {
            reason: format!(
                "compact serialization requires exactly one signature, envelope has {}",
                envelope.signatures.len()
            ),
        });
    }
    let entry = &envelope.signatures[0];
    let raw_protected = match entry.raw_protected() {
        Some(raw) => raw.to_string(),
        None => match entry.protected() {
            Some(headers) if !headers.is_empty() => {
                URL_SAFE_NO_PAD.encode(header_json(headers)?)
            }
            _ => {
                return Err(EnvelopeError::InvalidEnvelope {
                    reason: "compact serialization requires a protected header".to_string(),
                });
            }
        },
    };
    compact_string(&raw_protected, &envelope.payload, envelope.b64, entry.signature())
}

fn build_signed_entry(
    protected: Option<&HeaderSet>,
    public: Option<&HeaderSet>,
    payload: &[u8],
    signer: &dyn EnvelopeSigner,
) -> Result<(SignatureEntry, bool)> {
    let mut headers = protected.cloned().unwrap_or_default();
    headers.set_algorithm(signer.algorithm());
    if let Some(key_id) = signer.key_id() {
        if !key_id.is_empty() {
            headers.set_key_id(key_id);
        }
    }

    let raw_protected = URL_SAFE_NO_PAD.encode(header_json(&headers)?);
    let b64 = headers.b64().unwrap_or(true);
    let input = signing_input(&raw_protected, payload, b64);
    let signature = signer.sign(&input)?;
    debug!(algorithm = %signer.algorithm(), b64, "signed envelope entry");

    let public = public.filter(|headers| !headers.is_empty()).cloned();
    Ok((
        SignatureEntry {
            protected: Some(headers),
            public,
            signature,
            raw_protected: Some(raw_protected),
        },
        b64,
    ))
}

fn entry_doc(entry: &SignatureEntry) -> Result<EntryDoc> {
    if entry.signature().is_empty() {
        return Err(EnvelopeError::InvalidEnvelope {
            reason: "JSON serialization requires a non-empty signature".to_string(),
        });
    }
    let header = match entry.public() {
        Some(headers) if !headers.is_empty() => Some(
            serde_json::to_value(headers).map_err(|err| EnvelopeError::InvalidHeaderJson {
                reason: err.to_string(),
            })?,
        ),
        _ => None,
    };
    let protected = match entry.raw_protected() {
        Some(raw) => Some(raw.to_string()),
        None => match entry.protected() {
            Some(headers) if !headers.is_empty() => {
                Some(URL_SAFE_NO_PAD.encode(header_json(headers)?))
            }
            _ => None,
        },
    };
    Ok(EntryDoc {
        header,
        protected,
        signature: URL_SAFE_NO_PAD.encode(entry.signature()),
    })
}

fn header_json(headers: &HeaderSet) -> Result<Vec<u8>> {
    serde_json::to_vec(headers).map_err(|err| EnvelopeError::InvalidHeaderJson {
        reason: err.to_string(),
    })
}

fn payload_text(payload: &[u8], b64: bool) -> Result<String> {
    if b64 {
        Ok(URL_SAFE_NO_PAD.encode(payload))
    } else {
        String::from_utf8(payload.to_vec()).map_err(|_| EnvelopeError::InvalidEnvelope {
            reason: "unencoded payload is not valid UTF-8".to_string(),
        })
    }
}

fn compact_string(
    raw_protected: &str,
    payload: &[u8],
    b64: bool,
    signature: &[u8],
) -> Result<String> {
    let mut out = signing_input(raw_protected, payload, b64);
    out.push(b'.');
    out.extend_from_slice(URL_SAFE_NO_PAD.encode(signature).as_bytes());
    String::from_utf8(out).map_err(|_| EnvelopeError::InvalidEnvelope {
        reason: "unencoded payload is not valid UTF-8".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::SignatureAlgorithm;
    use crate::sign::SignatureKey;

    #[test]
    fn test_signing_input_respects_b64() {
        let encoded = signing_input("eyJ9", b"hi", true);
        assert_eq!(encoded, b"eyJ9.aGk".to_vec());
        let verbatim = signing_input("eyJ9", b"hi", false);
        assert_eq!(verbatim, b"eyJ9.hi".to_vec());
    }

    #[test]
    fn test_compact_parts_count() {
        assert!(matches!(
            decode_compact("a.b").unwrap_err(),
            EnvelopeError::InvalidCompactPartsCount { count: 2 }
        ));
        assert!(matches!(
            decode_compact("a.b.c.d").unwrap_err(),
            EnvelopeError::InvalidCompactPartsCount { count: 4 }
        ));
    }

    #[test]
    fn test_sign_compact_sets_alg_and_kid() {
        let signer = SignatureKey::hmac(SignatureAlgorithm::HS256, b"secret-key".to_vec())
            .unwrap()
            .with_key_id("kid-1");
        let token = sign_compact(&HeaderSet::new(), b"payload", &signer).unwrap();
        let envelope = decode_compact(&token).unwrap();
        let headers = envelope.signatures()[0].merged_headers();
        assert_eq!(headers.algorithm(), Some(SignatureAlgorithm::HS256));
        assert_eq!(headers.key_id(), Some("kid-1"));
        envelope.verify(&signer).unwrap();
    }

    #[test]
    fn test_empty_signer_key_id_not_written() {
        let signer = SignatureKey::hmac(SignatureAlgorithm::HS256, b"secret-key".to_vec())
            .unwrap()
            .with_key_id("");
        let token = sign_compact(&HeaderSet::new(), b"payload", &signer).unwrap();
        let envelope = decode_compact(&token).unwrap();
        assert_eq!(envelope.signatures()[0].merged_headers().key_id(), None);
    }
}
