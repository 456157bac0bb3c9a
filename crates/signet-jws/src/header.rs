//! Header parameter sets
//!
//! [`HeaderSet`] models one JOSE header object: the registered RFC 7515
//! parameters with their semantic types, plus any extension parameters
//! retained verbatim in insertion order. Re-serializing a decoded header is
//! not guaranteed to reproduce the original bytes; the codec keeps the raw
//! base64url text of protected headers separately for exactly that reason.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::algorithm::SignatureAlgorithm;
use crate::error::{EnvelopeError, Result};

const ALGORITHM: &str = "alg";
const B64: &str = "b64";
const CRITICAL: &str = "crit";
const CONTENT_TYPE: &str = "cty";
const JWK_SET_URL: &str = "jku";
const JWK: &str = "jwk";
const KEY_ID: &str = "kid";
const TYPE: &str = "typ";
const X509_CERT_CHAIN: &str = "x5c";
const X509_CERT_THUMBPRINT: &str = "x5t";
const X509_CERT_THUMBPRINT_S256: &str = "x5t#S256";
const X509_URL: &str = "x5u";

/// An ordered set of header parameters
///
/// Registered parameters are stored with their semantic types and serialized
/// in a fixed, stable order; extension parameters follow in the order they
/// were inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderSet {
    algorithm: Option<SignatureAlgorithm>,
    b64: Option<bool>,
    critical: Option<Vec<String>>,
    content_type: Option<String>,
    jwk_set_url: Option<String>,
    jwk: Option<Value>,
    key_id: Option<String>,
    typ: Option<String>,
    x509_cert_chain: Option<Vec<String>>,
    x509_cert_thumbprint: Option<String>,
    x509_cert_thumbprint_s256: Option<String>,
    x509_url: Option<String>,
    extra: Map<String, Value>,
}

impl HeaderSet {
    /// Create an empty header set
    pub fn new() -> Self {
        Self::default()
    }

    /// `alg` parameter
    pub fn algorithm(&self) -> Option<SignatureAlgorithm> {
        self.algorithm
    }

    /// Set the `alg` parameter
    pub fn set_algorithm(&mut self, algorithm: SignatureAlgorithm) {
        self.algorithm = Some(algorithm);
    }

    /// `b64` parameter; `None` when the header does not carry one
    ///
    /// Per RFC 7797 an absent `b64` means the payload is base64url-encoded,
    /// so most callers want `b64().unwrap_or(true)`.
    pub fn b64(&self) -> Option<bool> {
        self.b64
    }

    /// Set the `b64` parameter
    pub fn set_b64(&mut self, b64: bool) {
        self.b64 = Some(b64);
    }

    /// `kid` parameter
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Set the `kid` parameter
    pub fn set_key_id(&mut self, key_id: impl Into<String>) {
        self.key_id = Some(key_id.into());
    }

    /// `typ` parameter
    pub fn typ(&self) -> Option<&str> {
        self.typ.as_deref()
    }

    /// Set the `typ` parameter
    pub fn set_typ(&mut self, typ: impl Into<String>) {
        self.typ = Some(typ.into());
    }

    /// `cty` parameter
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Set the `cty` parameter
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// `jku` parameter
    pub fn jwk_set_url(&self) -> Option<&str> {
        self.jwk_set_url.as_deref()
    }

    /// `crit` parameter
    pub fn critical(&self) -> Option<&[String]> {
        self.critical.as_deref()
    }

    /// Look up any parameter by name, registered or extension
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            ALGORITHM => self.algorithm.map(|a| Value::String(a.as_str().to_string())),
            B64 => self.b64.map(Value::Bool),
            CRITICAL => self.critical.as_ref().map(|v| string_array(v)),
            CONTENT_TYPE => self.content_type.clone().map(Value::String),
            JWK_SET_URL => self.jwk_set_url.clone().map(Value::String),
            JWK => self.jwk.clone(),
            KEY_ID => self.key_id.clone().map(Value::String),
            TYPE => self.typ.clone().map(Value::String),
            X509_CERT_CHAIN => self.x509_cert_chain.as_ref().map(|v| string_array(v)),
            X509_CERT_THUMBPRINT => self.x509_cert_thumbprint.clone().map(Value::String),
            X509_CERT_THUMBPRINT_S256 => {
                self.x509_cert_thumbprint_s256.clone().map(Value::String)
            }
            X509_URL => self.x509_url.clone().map(Value::String),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Set any parameter by name
    ///
    /// Registered parameters are type-checked: a non-string `kid` or a
    /// non-boolean `b64` is rejected, and an unrecognized `alg` string fails
    /// with [`EnvelopeError::UnknownAlgorithm`]. Extension parameters accept
    /// any JSON value.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            ALGORITHM => {
                let text = expect_string(ALGORITHM, &value)?;
                self.algorithm = Some(text.parse()?);
            }
            B64 => {
                let Value::Bool(flag) = value else {
                    return Err(type_mismatch(B64, "a boolean"));
                };
                self.b64 = Some(flag);
            }
            CRITICAL => self.critical = Some(expect_string_array(CRITICAL, value)?),
            CONTENT_TYPE => {
                self.content_type = Some(expect_string(CONTENT_TYPE, &value)?.to_string());
            }
            JWK_SET_URL => {
                self.jwk_set_url = Some(expect_string(JWK_SET_URL, &value)?.to_string());
            }
            JWK => {
                if !value.is_object() {
                    return Err(type_mismatch(JWK, "a JSON object"));
                }
                self.jwk = Some(value);
            }
            KEY_ID => self.key_id = Some(expect_string(KEY_ID, &value)?.to_string()),
            TYPE => self.typ = Some(expect_string(TYPE, &value)?.to_string()),
            X509_CERT_CHAIN => {
                self.x509_cert_chain = Some(expect_string_array(X509_CERT_CHAIN, value)?);
            }
            X509_CERT_THUMBPRINT => {
                self.x509_cert_thumbprint =
                    Some(expect_string(X509_CERT_THUMBPRINT, &value)?.to_string());
            }
            X509_CERT_THUMBPRINT_S256 => {
                self.x509_cert_thumbprint_s256 =
                    Some(expect_string(X509_CERT_THUMBPRINT_S256, &value)?.to_string());
            }
            X509_URL => self.x509_url = Some(expect_string(X509_URL, &value)?.to_string()),
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
        Ok(())
    }

    /// Union of a public and a protected header set
    ///
    /// Used for verification-time decisions. On duplicate parameters the
    /// protected value is authoritative.
    pub fn merge(public: Option<&HeaderSet>, protected: Option<&HeaderSet>) -> HeaderSet {
        let mut merged = public.cloned().unwrap_or_default();
        if let Some(protected) = protected {
            if let Some(algorithm) = protected.algorithm {
                merged.algorithm = Some(algorithm);
            }
            if let Some(b64) = protected.b64 {
                merged.b64 = Some(b64);
            }
            if let Some(critical) = &protected.critical {
                merged.critical = Some(critical.clone());
            }
            if let Some(content_type) = &protected.content_type {
                merged.content_type = Some(content_type.clone());
            }
            if let Some(jwk_set_url) = &protected.jwk_set_url {
                merged.jwk_set_url = Some(jwk_set_url.clone());
            }
            if let Some(jwk) = &protected.jwk {
                merged.jwk = Some(jwk.clone());
            }
            if let Some(key_id) = &protected.key_id {
                merged.key_id = Some(key_id.clone());
            }
            if let Some(typ) = &protected.typ {
                merged.typ = Some(typ.clone());
            }
            if let Some(chain) = &protected.x509_cert_chain {
                merged.x509_cert_chain = Some(chain.clone());
            }
            if let Some(thumb) = &protected.x509_cert_thumbprint {
                merged.x509_cert_thumbprint = Some(thumb.clone());
            }
            if let Some(thumb) = &protected.x509_cert_thumbprint_s256 {
                merged.x509_cert_thumbprint_s256 = Some(thumb.clone());
            }
            if let Some(url) = &protected.x509_url {
                merged.x509_url = Some(url.clone());
            }
            for (name, value) in &protected.extra {
                merged.extra.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    /// Whether no parameter is set
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of parameters set
    pub fn len(&self) -> usize {
        let registered = [
            self.algorithm.is_some(),
            self.b64.is_some(),
            self.critical.is_some(),
            self.content_type.is_some(),
            self.jwk_set_url.is_some(),
            self.jwk.is_some(),
            self.key_id.is_some(),
            self.typ.is_some(),
            self.x509_cert_chain.is_some(),
            self.x509_cert_thumbprint.is_some(),
            self.x509_cert_thumbprint_s256.is_some(),
            self.x509_url.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();
        registered + self.extra.len()
    }

    /// Parse a header set from a JSON object value
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(entries) = value else {
            return Err(EnvelopeError::InvalidHeaderJson {
                reason: "header must be a JSON object".to_string(),
            });
        };
        let mut headers = HeaderSet::new();
        for (name, value) in entries {
            headers.set(&name, value)?;
        }
        Ok(headers)
    }

    /// Parse a header set from JSON bytes
    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(data).map_err(|err| EnvelopeError::InvalidHeaderJson {
                reason: err.to_string(),
            })?;
        Self::from_value(value)
    }
}

impl Serialize for HeaderSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        if let Some(algorithm) = self.algorithm {
            map.serialize_entry(ALGORITHM, algorithm.as_str())?;
        }
        if let Some(b64) = self.b64 {
            map.serialize_entry(B64, &b64)?;
        }
        if let Some(critical) = &self.critical {
            map.serialize_entry(CRITICAL, critical)?;
        }
        if let Some(content_type) = &self.content_type {
            map.serialize_entry(CONTENT_TYPE, content_type)?;
        }
        if let Some(jwk_set_url) = &self.jwk_set_url {
            map.serialize_entry(JWK_SET_URL, jwk_set_url)?;
        }
        if let Some(jwk) = &self.jwk {
            map.serialize_entry(JWK, jwk)?;
        }
        if let Some(key_id) = &self.key_id {
            map.serialize_entry(KEY_ID, key_id)?;
        }
        if let Some(typ) = &self.typ {
            map.serialize_entry(TYPE, typ)?;
        }
        if let Some(chain) = &self.x509_cert_chain {
            map.serialize_entry(X509_CERT_CHAIN, chain)?;
        }
        if let Some(thumb) = &self.x509_cert_thumbprint {
            map.serialize_entry(X509_CERT_THUMBPRINT, thumb)?;
        }
        if let Some(thumb) = &self.x509_cert_thumbprint_s256 {
            map.serialize_entry(X509_CERT_THUMBPRINT_S256, thumb)?;
        }
        if let Some(url) = &self.x509_url {
            map.serialize_entry(X509_URL, url)?;
        }
        for (name, value) in &self.extra {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn string_array(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

fn expect_string<'v>(name: &str, value: &'v Value) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| type_mismatch(name, "a string"))
}

fn expect_string_array(name: &str, value: Value) -> Result<Vec<String>> {
    let Value::Array(items) = value else {
        return Err(type_mismatch(name, "an array of strings"));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(text) => Ok(text),
            _ => Err(type_mismatch(name, "an array of strings")),
        })
        .collect()
}

fn type_mismatch(name: &str, expected: &str) -> EnvelopeError {
    EnvelopeError::InvalidHeaderJson {
        reason: format!("{name} must be {expected}"),
    }
}
