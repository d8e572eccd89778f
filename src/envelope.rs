//! Versioned, armored text envelope for encrypted notes
//!
//! The armored format is:
//!
//! ```text
//! -----BEGIN ENCRYPTED NOTE-----
//! <base64 of compact JSON, wrapped at 64 columns>
//! -----END ENCRYPTED NOTE-----
//! ```
//!
//! The JSON body is
//! `{"v":1,"s":salt,"i":nonce,"n":iterations,"c":compressed,"d":ciphertext,"m":metadata}`
//! where binary fields are standard base64 with padding and `m` is
//! optional. Iterations and the compression flag are structural: they
//! are needed to decrypt and are authenticated as associated data.
//! Metadata is advisory.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cipher::NONCE_LEN;
use crate::error::{ErrorCategory, ErrorKind, NotecryptError, Result};
use crate::kdf::SALT_LEN;

pub const BEGIN_MARKER: &str = "-----BEGIN ENCRYPTED NOTE-----";
pub const END_MARKER: &str = "-----END ENCRYPTED NOTE-----";

/// The only envelope version this crate reads or writes.
pub const VERSION: u64 = 1;

/// Column at which the base64 body is wrapped.
const LINE_WIDTH: usize = 64;

/// Advisory information about how a note was encrypted.
///
/// Never consulted when decrypting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub timestamp: String,
    pub algorithm: String,
    pub key_length: u32,
    pub iterations: u32,
    pub compressed: bool,
}

/// Decoded contents of an armored note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub iterations: u32,
    pub compressed: bool,
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
    pub metadata: Option<Metadata>,
}

#[derive(Serialize, Deserialize)]
struct Wire {
    v: u64,
    s: String,
    i: String,
    n: u32,
    c: bool,
    d: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    m: Option<Metadata>,
}

#[derive(Serialize)]
struct Header<'a> {
    v: u64,
    n: u32,
    c: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    m: Option<&'a Metadata>,
}

impl Envelope {
    /// Bytes authenticated alongside the ciphertext.
    ///
    /// Binds the version, iteration count, compression flag and metadata,
    /// so none of them can be altered without failing decryption.
    pub fn associated_data(&self) -> Result<Vec<u8>> {
        let header = Header {
            v: VERSION,
            n: self.iterations,
            c: self.compressed,
            m: self.metadata.as_ref(),
        };
        serde_json::to_vec(&header).map_err(internal_json_error)
    }
}

/// Returns true if `text` contains both armor markers.
pub fn looks_like_envelope(text: &str) -> bool {
    text.contains(BEGIN_MARKER) && text.contains(END_MARKER)
}

/// Serialize an envelope to its armored text form.
pub fn encode(envelope: &Envelope) -> Result<String> {
    let wire = Wire {
        v: VERSION,
        s: STANDARD.encode(envelope.salt),
        i: STANDARD.encode(envelope.nonce),
        n: envelope.iterations,
        c: envelope.compressed,
        d: STANDARD.encode(&envelope.ciphertext),
        m: envelope.metadata.clone(),
    };
    let json = serde_json::to_vec(&wire).map_err(internal_json_error)?;
    let body = STANDARD.encode(json);

    let mut armored = String::with_capacity(
        BEGIN_MARKER.len() + END_MARKER.len() + body.len() + body.len() / LINE_WIDTH + 2,
    );
    armored.push_str(BEGIN_MARKER);
    armored.push('\n');
    // base64 output is ASCII, so byte chunks are always valid str slices.
    for line in body.as_bytes().chunks(LINE_WIDTH) {
        armored.push_str(std::str::from_utf8(line).map_err(|e| {
            NotecryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "base64 output was not ASCII",
                e,
            )
        })?);
        armored.push('\n');
    }
    armored.push_str(END_MARKER);

    Ok(armored)
}

/// Parse armored text back into an envelope.
pub fn decode(armored: &str) -> Result<Envelope> {
    let start = armored
        .find(BEGIN_MARKER)
        .ok_or_else(|| NotecryptError::malformed("missing begin marker"))?
        + BEGIN_MARKER.len();
    let end = armored[start..]
        .find(END_MARKER)
        .ok_or_else(|| NotecryptError::malformed("missing end marker"))?
        + start;

    let body: String = armored[start..end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if body.is_empty() {
        return Err(NotecryptError::malformed("envelope body is empty"));
    }

    let json = STANDARD.decode(body.as_bytes()).map_err(|e| {
        NotecryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedEnvelope,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })?;
    let value: Value = serde_json::from_slice(&json).map_err(malformed_json_error)?;

    // Version is checked before anything else so that a future format is
    // reported as such rather than as a missing field.
    match value.get("v") {
        None => return Err(NotecryptError::malformed("envelope has no version field")),
        Some(v) if v.as_u64() == Some(VERSION) => {}
        Some(v) => {
            return Err(NotecryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnsupportedVersion,
                format!("unsupported envelope version {}", v),
            ));
        }
    }

    let wire: Wire = serde_json::from_value(value).map_err(malformed_json_error)?;

    if wire.n == 0 {
        return Err(NotecryptError::malformed("iteration count must be positive"));
    }

    Ok(Envelope {
        salt: decode_fixed(&wire.s, "salt")?,
        nonce: decode_fixed(&wire.i, "nonce")?,
        iterations: wire.n,
        compressed: wire.c,
        ciphertext: decode_field(&wire.d, "ciphertext")?,
        metadata: wire.m,
    })
}

fn decode_field(encoded: &str, field: &str) -> Result<Vec<u8>> {
    STANDARD.decode(encoded).map_err(|e| {
        NotecryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedEnvelope,
            format!("invalid base64 in {}", field),
            e,
        )
    })
}

fn decode_fixed<const N: usize>(encoded: &str, field: &str) -> Result<[u8; N]> {
    let bytes = decode_field(encoded, field)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        NotecryptError::malformed(format!("{} must be {} bytes, got {}", field, N, len))
    })
}

fn malformed_json_error(e: serde_json::Error) -> NotecryptError {
    NotecryptError::with_kind_and_source(
        ErrorCategory::User,
        ErrorKind::MalformedEnvelope,
        format!("envelope structure is invalid: {}", e),
        e,
    )
}

fn internal_json_error(e: serde_json::Error) -> NotecryptError {
    NotecryptError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        "failed to serialize envelope",
        e,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(metadata: Option<Metadata>) -> Envelope {
        Envelope {
            salt: [0x42; SALT_LEN],
            nonce: [0x24; NONCE_LEN],
            iterations: 100_000,
            compressed: true,
            ciphertext: (0..=255).collect(),
            metadata,
        }
    }

    fn sample_metadata() -> Metadata {
        Metadata {
            timestamp: "2024-05-01T12:00:00.000Z".to_string(),
            algorithm: "AES-GCM".to_string(),
            key_length: 256,
            iterations: 100_000,
            compressed: true,
        }
    }

    /// Armor arbitrary JSON the way `encode` would.
    fn armor_json(json: &str) -> String {
        format!(
            "{}\n{}\n{}",
            BEGIN_MARKER,
            STANDARD.encode(json.as_bytes()),
            END_MARKER
        )
    }

    #[test]
    fn test_roundtrip_without_metadata() {
        let envelope = sample(None);
        let decoded = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_roundtrip_with_metadata() {
        let envelope = sample(Some(sample_metadata()));
        let decoded = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_roundtrip_empty_ciphertext() {
        let mut envelope = sample(None);
        envelope.ciphertext.clear();
        envelope.compressed = false;
        assert_eq!(decode(&encode(&envelope).unwrap()).unwrap(), envelope);
    }

    #[test]
    fn test_layout() {
        let armored = encode(&sample(Some(sample_metadata()))).unwrap();
        let lines: Vec<&str> = armored.lines().collect();

        assert_eq!(lines[0], BEGIN_MARKER);
        assert_eq!(*lines.last().unwrap(), END_MARKER);
        assert!(!armored.ends_with('\n'));

        let body = &lines[1..lines.len() - 1];
        assert!(body.len() > 1);
        for line in &body[..body.len() - 1] {
            assert_eq!(line.len(), LINE_WIDTH);
        }
        assert!(body[body.len() - 1].len() <= LINE_WIDTH);
        assert!(!body.last().unwrap().is_empty());
    }

    #[test]
    fn test_exact_json_body() {
        let envelope = Envelope {
            salt: [0u8; SALT_LEN],
            nonce: [1u8; NONCE_LEN],
            iterations: 1_000,
            compressed: false,
            ciphertext: vec![0xff; 16],
            metadata: None,
        };
        let armored = encode(&envelope).unwrap();
        let body: String = armored
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();
        let json = String::from_utf8(STANDARD.decode(body).unwrap()).unwrap();

        assert_eq!(
            json,
            r#"{"v":1,"s":"AAAAAAAAAAAAAAAAAAAAAA==","i":"AQEBAQEBAQEBAQEB","n":1000,"c":false,"d":"/////////////////////w=="}"#
        );
    }

    #[test]
    fn test_associated_data() {
        let envelope = sample(None);
        assert_eq!(
            envelope.associated_data().unwrap(),
            br#"{"v":1,"n":100000,"c":true}"#
        );

        let envelope = sample(Some(sample_metadata()));
        assert_eq!(
            String::from_utf8(envelope.associated_data().unwrap()).unwrap(),
            r#"{"v":1,"n":100000,"c":true,"m":{"timestamp":"2024-05-01T12:00:00.000Z","algorithm":"AES-GCM","keyLength":256,"iterations":100000,"compressed":true}}"#
        );
    }

    #[test]
    fn test_tolerates_surrounding_text_and_crlf() {
        let armored = encode(&sample(None)).unwrap();
        let mangled = format!(
            "Here is my note:\r\n\r\n{}\r\n\r\nthanks!",
            armored.replace('\n', "\r\n  ")
        );
        assert_eq!(decode(&mangled).unwrap(), sample(None));
    }

    #[test]
    fn test_missing_markers() {
        let armored = encode(&sample(None)).unwrap();

        let no_begin = armored.replace(BEGIN_MARKER, "");
        let err = decode(&no_begin).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));

        let no_end = armored.replace(END_MARKER, "");
        let err = decode(&no_end).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));

        let err = decode("").expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_end_before_begin() {
        let text = format!("{}\nAAAA\n{}", END_MARKER, BEGIN_MARKER);
        let err = decode(&text).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_empty_body() {
        let text = format!("{}\n\n{}", BEGIN_MARKER, END_MARKER);
        let err = decode(&text).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_bad_base64() {
        let text = format!("{}\nnot$$base64\n{}", BEGIN_MARKER, END_MARKER);
        let err = decode(&text).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_not_json() {
        let err = decode(&armor_json("this is not json")).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_missing_fields() {
        let cases = [
            r#"{"v":1,"i":"AQEBAQEBAQEBAQEB","n":1000,"c":false,"d":"AAAA"}"#,
            r#"{"v":1,"s":"AAAAAAAAAAAAAAAAAAAAAA==","n":1000,"c":false,"d":"AAAA"}"#,
            r#"{"v":1,"s":"AAAAAAAAAAAAAAAAAAAAAA==","i":"AQEBAQEBAQEBAQEB","n":1000,"c":false}"#,
            r#"{"v":1,"s":"AAAAAAAAAAAAAAAAAAAAAA==","i":"AQEBAQEBAQEBAQEB","c":false,"d":"AAAA"}"#,
            r#"{"v":1,"s":"AAAAAAAAAAAAAAAAAAAAAA==","i":"AQEBAQEBAQEBAQEB","n":1000,"d":"AAAA"}"#,
            r#"{"s":"AAAAAAAAAAAAAAAAAAAAAA==","i":"AQEBAQEBAQEBAQEB","n":1000,"c":false,"d":"AAAA"}"#,
        ];
        for json in cases {
            let err = decode(&armor_json(json)).expect_err(json);
            assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope), "{}", json);
        }
    }

    #[test]
    fn test_wrong_field_lengths() {
        let short_salt = r#"{"v":1,"s":"AAAAAAAAAAA=","i":"AQEBAQEBAQEBAQEB","n":1000,"c":false,"d":"AAAA"}"#;
        let err = decode(&armor_json(short_salt)).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));

        let long_nonce = r#"{"v":1,"s":"AAAAAAAAAAAAAAAAAAAAAA==","i":"AQEBAQEBAQEBAQEBAQEBAQEB","n":1000,"c":false,"d":"AAAA"}"#;
        let err = decode(&armor_json(long_nonce)).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_zero_iterations() {
        let json = r#"{"v":1,"s":"AAAAAAAAAAAAAAAAAAAAAA==","i":"AQEBAQEBAQEBAQEB","n":0,"c":false,"d":"AAAA"}"#;
        let err = decode(&armor_json(json)).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_unsupported_versions() {
        for v in ["0", "2", "999", "-1", "1.5", r#""1""#, "null", "true"] {
            let json = format!(
                r#"{{"v":{},"s":"AAAAAAAAAAAAAAAAAAAAAA==","i":"AQEBAQEBAQEBAQEB","n":1000,"c":false,"d":"AAAA"}}"#,
                v
            );
            let err = decode(&armor_json(&json)).expect_err(&json);
            assert_eq!(err.kind, Some(ErrorKind::UnsupportedVersion), "{}", json);
        }
    }

    #[test]
    fn test_future_version_reported_before_missing_fields() {
        let err = decode(&armor_json(r#"{"v":2,"x":"new layout"}"#)).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::UnsupportedVersion));
    }

    #[test]
    fn test_looks_like_envelope() {
        let armored = encode(&sample(None)).unwrap();
        assert!(looks_like_envelope(&armored));
        assert!(looks_like_envelope(&format!("prefix {} suffix", armored)));
        assert!(!looks_like_envelope("plain text note"));
        assert!(!looks_like_envelope(BEGIN_MARKER));
    }
}
