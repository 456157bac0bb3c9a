//! JSON serialization: general and flattened forms, structural invariants

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use signet_jws::{Envelope, EnvelopeError, SignatureAlgorithm, SignatureKey};

// RFC 7515 appendix A.6: one RS256 and one ES256 signature over the same payload
const GENERAL_DOC: &str = r#"{
    "payload": "eyJpc3MiOiJqb2UiLA0KICJleHAiOjEzMDA4MTkzODAsDQogImh0dHA6Ly9leGFtcGxlLmNvbS9pc19yb290Ijp0cnVlfQ",
    "signatures":[
      {
        "header": {"kid":"2010-12-29"},
        "protected":"eyJhbGciOiJSUzI1NiJ9",
        "signature": "cC4hiUPoj9Eetdgtv3hF80EGrhuB__dzERat0XF9g2VtQgr9PJbu3XOiZj5RZmh7AAuHIm4Bh-0Qc_lF5YKt_O8W2Fp5jujGbds9uJdbF9CUAr7t1dnZcAcQjbKBYNX4BAynRFdiuB--f_nZLgrnbyTyWzO75vRK5h6xBArLIARNPvkSjtQBMHlb1L07Qe7K0GarZRmB_eSN9383LcOLn6_dO--xi12jzDwusC-eOkHWEsqtFZESc6BfI7noOPqvhJ1phCnvWh6IeYI2w9QOYEUipUTI8np6LbgGY9Fs98rqVt5AXLIhWkWywlVmtVrBp0igcN_IoypGlUPQGe77Rw"
      },
      {
        "header": {"kid":"e9bc097a-ce51-4036-9562-d2ade882db0d"},
        "protected":"eyJhbGciOiJFUzI1NiJ9",
        "signature": "DtEhU3ljbEg8L38VWAfUAqOyKAM6-Xx-F4GawxaepmXFCgfTjDxw5djxLa8ISlSApmWQxfKTUJqPP3-Kg6NU1Q"
      }
    ]
  }"#;

const FLATTENED_DOC: &str = r#"{
    "payload": "eyJpc3MiOiJqb2UiLA0KICJleHAiOjEzMDA4MTkzODAsDQogImh0dHA6Ly9leGFtcGxlLmNvbS9pc19yb290Ijp0cnVlfQ",
    "protected":"eyJhbGciOiJFUzI1NiJ9",
    "header": {
      "kid":"e9bc097a-ce51-4036-9562-d2ade882db0d"
    },
    "signature": "DtEhU3ljbEg8L38VWAfUAqOyKAM6-Xx-F4GawxaepmXFCgfTjDxw5djxLa8ISlSApmWQxfKTUJqPP3-Kg6NU1Q"
  }"#;

#[test]
fn general_document_parses() {
    let envelope = Envelope::parse(GENERAL_DOC.as_bytes()).unwrap();
    assert_eq!(envelope.signatures().len(), 2);

    let rsa_entries = envelope.lookup_signature("2010-12-29");
    assert_eq!(rsa_entries.len(), 1);
    assert_eq!(
        rsa_entries[0].merged_headers().algorithm(),
        Some(SignatureAlgorithm::RS256)
    );

    let ec_entries = envelope.lookup_signature("e9bc097a-ce51-4036-9562-d2ade882db0d");
    assert_eq!(ec_entries.len(), 1);
    assert_eq!(
        ec_entries[0].merged_headers().algorithm(),
        Some(SignatureAlgorithm::ES256)
    );

    assert!(envelope.lookup_signature("no-such-kid").is_empty());
}

#[test]
fn general_document_remarshals_to_equivalent_json() {
    let envelope = Envelope::from_json(GENERAL_DOC.as_bytes()).unwrap();
    let rendered = envelope.to_json().unwrap();

    let original: serde_json::Value = serde_json::from_str(GENERAL_DOC).unwrap();
    let roundtripped: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(original, roundtripped);
}

#[test]
fn decode_encode_decode_is_stable() {
    let first = Envelope::from_json(GENERAL_DOC.as_bytes()).unwrap();
    let second = Envelope::from_json(first.to_json().unwrap().as_bytes()).unwrap();

    assert_eq!(first.payload(), second.payload());
    assert_eq!(first.b64(), second.b64());
    assert_eq!(first.signatures().len(), second.signatures().len());
    for (a, b) in first.signatures().iter().zip(second.signatures()) {
        assert_eq!(a.signature(), b.signature());
        assert_eq!(
            a.merged_headers().algorithm(),
            b.merged_headers().algorithm()
        );
        assert_eq!(a.merged_headers().key_id(), b.merged_headers().key_id());
    }
}

#[test]
fn flattened_document_parses() {
    let envelope = Envelope::parse(FLATTENED_DOC.as_bytes()).unwrap();
    assert_eq!(envelope.signatures().len(), 1);

    let entry = &envelope.signatures()[0];
    assert_eq!(
        entry.merged_headers().algorithm(),
        Some(SignatureAlgorithm::ES256)
    );
    assert_eq!(
        entry.merged_headers().key_id(),
        Some("e9bc097a-ce51-4036-9562-d2ade882db0d")
    );
    assert_eq!(entry.raw_protected(), Some("eyJhbGciOiJFUzI1NiJ9"));
}

#[test]
fn single_signature_envelope_emits_flattened_form() {
    let envelope = Envelope::from_json(FLATTENED_DOC.as_bytes()).unwrap();
    let rendered = envelope.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

    assert!(value.get("signature").is_some());
    assert!(value.get("signatures").is_none());

    let original: serde_json::Value = serde_json::from_str(FLATTENED_DOC).unwrap();
    assert_eq!(value, original);
}

#[test]
fn both_signature_and_signatures_rejected() {
    let doc = r#"{
      "payload": "cGF5bG9hZA",
      "signature": "c2ln",
      "signatures": [{"protected":"eyJhbGciOiJIUzI1NiJ9","signature":"c2ln"}]
    }"#;
    let err = Envelope::from_json(doc.as_bytes()).unwrap_err();
    assert!(matches!(err, EnvelopeError::InvalidEnvelope { .. }));
}

#[test]
fn missing_signatures_rejected() {
    let err = Envelope::from_json(br#"{"payload": "cGF5bG9hZA"}"#).unwrap_err();
    assert!(matches!(err, EnvelopeError::InvalidEnvelope { .. }));
}

#[test]
fn b64_disagreement_rejected() {
    let with_b64_false = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","b64":false}"#);
    let without_b64 = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
    let doc = format!(
        r#"{{
          "payload": "hello",
          "signatures": [
            {{"protected":"{with_b64_false}","signature":"c2lnLW9uZQ"}},
            {{"protected":"{without_b64}","signature":"c2lnLXR3bw"}}
          ]
        }}"#
    );
    let err = Envelope::from_json(doc.as_bytes()).unwrap_err();
    assert!(matches!(err, EnvelopeError::InvalidEnvelope { .. }));
}

#[test]
fn entry_without_protected_header_skips_b64_agreement() {
    // The second entry has no protected header at all, so it neither sets
    // nor contests the b64 value established by the first entry.
    let with_b64_false = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","b64":false}"#);
    let doc = format!(
        r#"{{
          "payload": "raw payload",
          "signatures": [
            {{"protected":"{with_b64_false}","signature":"c2lnLW9uZQ"}},
            {{"header":{{"kid":"unprotected-only"}},"signature":"c2lnLXR3bw"}}
          ]
        }}"#
    );
    let envelope = Envelope::from_json(doc.as_bytes()).unwrap();
    assert!(!envelope.b64());
    assert_eq!(envelope.payload(), b"raw payload");
    assert_eq!(envelope.signatures().len(), 2);
    assert_eq!(envelope.lookup_signature("unprotected-only").len(), 1);
}

#[test]
fn empty_signature_field_rejected() {
    let doc = r#"{
      "payload": "cGF5bG9hZA",
      "signatures": [{"protected":"eyJhbGciOiJIUzI1NiJ9","signature":""}]
    }"#;
    let err = Envelope::from_json(doc.as_bytes()).unwrap_err();
    assert!(matches!(err, EnvelopeError::InvalidEnvelope { .. }));
}

#[test]
fn empty_payload_rejected() {
    let doc = r#"{
      "payload": "",
      "signatures": [{"protected":"eyJhbGciOiJIUzI1NiJ9","signature":"c2ln"}]
    }"#;
    let err = Envelope::from_json(doc.as_bytes()).unwrap_err();
    assert!(matches!(err, EnvelopeError::InvalidEnvelope { .. }));
}

#[test]
fn unencoded_payload_is_used_verbatim() {
    let protected = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","b64":false}"#);
    let doc = format!(
        r#"{{
          "payload": "$.02 is all it costs",
          "signatures": [{{"protected":"{protected}","signature":"c2ln"}}]
        }}"#
    );
    let envelope = Envelope::from_json(doc.as_bytes()).unwrap();
    assert!(!envelope.b64());
    assert_eq!(envelope.payload(), b"$.02 is all it costs");
}

#[test]
fn verifies_a_freshly_signed_flattened_document() {
    let signer = SignatureKey::hmac(SignatureAlgorithm::HS256, b"another secret".to_vec())
        .unwrap()
        .with_key_id("hs-key");
    let envelope =
        signet_jws::sign_multi(b"doc payload", &[signet_jws::SignRequest {
            signer: &signer,
            protected: None,
            public: None,
        }])
        .unwrap();

    let rendered = envelope.to_json().unwrap();
    let reparsed = Envelope::from_json(rendered.as_bytes()).unwrap();
    reparsed.verify(&signer).unwrap();
    assert_eq!(reparsed.lookup_signature("hs-key").len(), 1);
}
