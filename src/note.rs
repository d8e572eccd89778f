//! Encryption/decryption of notes using PBKDF2 + AES-256-GCM
//!
//! Each call is a self-contained pipeline:
//!
//! - encrypt: derive key -> prepare payload -> seal -> encode envelope
//! - decrypt: decode envelope -> derive key -> open -> restore payload
//!
//! Nothing is shared between calls; derived keys are dropped (and wiped)
//! before each call returns.

use chrono::{SecondsFormat, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;

use crate::cipher::{self, NONCE_LEN};
use crate::envelope::{self, Envelope, Metadata};
use crate::error::{NotecryptError, Result};
use crate::kdf::{self, DEFAULT_ITERATIONS, KEY_LEN, SALT_LEN};
use crate::payload::{self, Prepared};

/// Minimum password length, in characters, accepted for encryption.
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Algorithm name recorded in advisory metadata.
pub const ALGORITHM: &str = "AES-GCM";

/// Options chosen at encryption time.
///
/// Everything needed to decrypt is recorded in the envelope, so there is
/// no decrypt-side counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptOptions {
    /// PBKDF2 iteration count. Must be positive.
    pub iterations: u32,
    /// Compress the note before encrypting it.
    pub compress: bool,
    /// Record advisory metadata (timestamp, algorithm, parameters).
    pub include_metadata: bool,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            compress: true,
            include_metadata: false,
        }
    }
}

/// Resource bounds applied when decrypting envelopes from untrusted sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest iteration count we are willing to run the KDF with.
    pub max_iterations: u32,
    /// Largest decrypted (and decompressed) note, in bytes.
    pub max_plaintext_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_iterations: 10_000_000,
            max_plaintext_len: 64 * 1024 * 1024,
        }
    }
}

/// Encrypt a text note, returning the armored envelope.
pub fn encrypt_note(plaintext: &str, password: &str, options: &EncryptOptions) -> Result<String> {
    if plaintext.is_empty() {
        return Err(NotecryptError::invalid_parameter(
            "please enter text to encrypt",
        ));
    }
    check_password(password.as_bytes())?;

    let envelope = encrypt_bytes(plaintext.as_bytes(), password.as_bytes(), options)?;
    envelope::encode(&envelope)
}

/// Decrypt an armored note with default [`Limits`].
pub fn decrypt_note(armored: &str, password: &str) -> Result<String> {
    decrypt_note_with_limits(armored, password, &Limits::default())
}

/// Decrypt an armored note.
pub fn decrypt_note_with_limits(armored: &str, password: &str, limits: &Limits) -> Result<String> {
    if password.is_empty() {
        return Err(NotecryptError::invalid_parameter(
            "please enter the decryption password",
        ));
    }

    let envelope = envelope::decode(armored)?;
    let plaintext = decrypt_bytes(&envelope, password.as_bytes(), limits)?;
    String::from_utf8(plaintext)
        .map_err(|_| NotecryptError::malformed("decrypted note is not valid UTF-8"))
}

/// Encrypt arbitrary bytes with a random salt and nonce.
///
/// Unlike [`encrypt_note`] this accepts empty plaintext and does not
/// enforce a minimum password length.
pub fn encrypt_bytes(plaintext: &[u8], password: &[u8], options: &EncryptOptions) -> Result<Envelope> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    encrypt_bytes_deterministic(plaintext, password, options, &salt, &nonce, &timestamp)
}

/// Encrypt bytes using the provided salt, nonce and metadata timestamp.
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `encrypt_bytes()` which generates
/// random salt/nonce.
pub fn encrypt_bytes_deterministic(
    plaintext: &[u8],
    password: &[u8],
    options: &EncryptOptions,
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
    timestamp: &str,
) -> Result<Envelope> {
    if password.is_empty() {
        return Err(NotecryptError::invalid_parameter(
            "please enter an encryption password",
        ));
    }

    let prepared = payload::prepare(plaintext, options.compress);
    seal_prepared(&prepared, plaintext.len(), password, options, salt, nonce, timestamp)
}

/// Seal an already prepared payload. The envelope's compression flag
/// and metadata follow `prepared`, not `options.compress`.
fn seal_prepared(
    prepared: &Prepared,
    plaintext_len: usize,
    password: &[u8],
    options: &EncryptOptions,
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
    timestamp: &str,
) -> Result<Envelope> {
    let key = kdf::derive_key(password, salt, options.iterations)?;
    let compressed = prepared.is_compressed();

    // Metadata reflects what actually happened, not what was requested.
    let metadata = options.include_metadata.then(|| Metadata {
        timestamp: timestamp.to_string(),
        algorithm: ALGORITHM.to_string(),
        key_length: (KEY_LEN * 8) as u32,
        iterations: options.iterations,
        compressed,
    });

    let mut envelope = Envelope {
        salt: *salt,
        nonce: *nonce,
        iterations: options.iterations,
        compressed,
        ciphertext: Vec::new(),
        metadata,
    };
    let aad = envelope.associated_data()?;
    envelope.ciphertext = cipher::seal(&key, nonce, prepared.bytes(), &aad)?;

    debug!(
        plaintext_len,
        sealed_len = envelope.ciphertext.len(),
        compressed,
        "sealed note"
    );
    Ok(envelope)
}

/// Decrypt a decoded envelope back to the original bytes.
pub fn decrypt_bytes(envelope: &Envelope, password: &[u8], limits: &Limits) -> Result<Vec<u8>> {
    if envelope.iterations > limits.max_iterations {
        return Err(NotecryptError::invalid_parameter(format!(
            "envelope requires {} iterations, above the limit of {}",
            envelope.iterations, limits.max_iterations
        )));
    }

    let key = kdf::derive_key(password, &envelope.salt, envelope.iterations)?;
    let aad = envelope.associated_data()?;
    let opened = cipher::open(&key, &envelope.nonce, &envelope.ciphertext, &aad)?;
    drop(key);

    payload::restore(&opened, envelope.compressed, limits.max_plaintext_len)
}

/// Reject passwords that are empty or shorter than [`MIN_PASSWORD_CHARS`].
///
/// Length is counted in characters when the password is UTF-8 and in
/// bytes otherwise.
pub fn check_password(password: &[u8]) -> Result<()> {
    if password.is_empty() {
        return Err(NotecryptError::invalid_parameter(
            "please enter an encryption password",
        ));
    }
    let len = match std::str::from_utf8(password) {
        Ok(s) => s.chars().count(),
        Err(_) => password.len(),
    };
    if len < MIN_PASSWORD_CHARS {
        return Err(NotecryptError::invalid_parameter(format!(
            "password must be at least {} characters long",
            MIN_PASSWORD_CHARS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const PASSWORD: &str = "correct horse battery staple";

    fn fast() -> EncryptOptions {
        EncryptOptions {
            iterations: 1_000,
            ..EncryptOptions::default()
        }
    }

    #[test]
    fn test_defaults() {
        let options = EncryptOptions::default();
        assert_eq!(options.iterations, 100_000);
        assert!(options.compress);
        assert!(!options.include_metadata);
    }

    #[test]
    fn test_note_roundtrip() {
        let armored = encrypt_note("Hello, Privacy!", PASSWORD, &fast()).unwrap();
        assert_eq!(decrypt_note(&armored, PASSWORD).unwrap(), "Hello, Privacy!");
    }

    #[test]
    fn test_plaintext_is_not_trimmed() {
        let text = "  padded note\n\n";
        let armored = encrypt_note(text, PASSWORD, &fast()).unwrap();
        assert_eq!(decrypt_note(&armored, PASSWORD).unwrap(), text);
    }

    #[test]
    fn test_empty_note_rejected() {
        let err = encrypt_note("", PASSWORD, &fast()).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameter));
    }

    #[test]
    fn test_empty_bytes_roundtrip() {
        let envelope = encrypt_bytes(b"", b"pw", &fast()).unwrap();
        let decrypted = decrypt_bytes(&envelope, b"pw", &Limits::default()).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_password_checks() {
        let err = encrypt_note("note", "", &fast()).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameter));

        let err = encrypt_note("note", "short", &fast()).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameter));

        let err = encrypt_note("note", "1234567", &fast()).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameter));

        assert!(encrypt_note("note", "12345678", &fast()).is_ok());
    }

    #[test]
    fn test_password_length_counts_characters() {
        // 7 characters but 14 bytes
        assert!(check_password("ééééééé".as_bytes()).is_err());
        // 8 characters
        assert!(check_password("éééééééé".as_bytes()).is_ok());
        // Non-UTF-8 falls back to byte length
        assert!(check_password(&[0xff; 8]).is_ok());
        assert!(check_password(&[0xff; 7]).is_err());
    }

    #[test]
    fn test_decrypt_empty_password_rejected() {
        let armored = encrypt_note("note", PASSWORD, &fast()).unwrap();
        let err = decrypt_note(&armored, "").expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameter));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let options = EncryptOptions {
            iterations: 0,
            ..fast()
        };
        let err = encrypt_note("note", PASSWORD, &options).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameter));
    }

    #[test]
    fn test_wrong_password() {
        let armored = encrypt_note("secret data", PASSWORD, &fast()).unwrap();
        let err = decrypt_note(&armored, "wrong password").expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailure));
        assert_eq!(err.message(), "incorrect password or corrupted data");
    }

    #[test]
    fn test_deterministic_encryption() {
        let salt = [1u8; SALT_LEN];
        let nonce = [2u8; NONCE_LEN];
        let ts = "2024-05-01T12:00:00.000Z";

        let e1 = encrypt_bytes_deterministic(b"hello", b"password", &fast(), &salt, &nonce, ts)
            .unwrap();
        let e2 = encrypt_bytes_deterministic(b"hello", b"password", &fast(), &salt, &nonce, ts)
            .unwrap();
        assert_eq!(e1, e2);

        let other_nonce = [3u8; NONCE_LEN];
        let e3 =
            encrypt_bytes_deterministic(b"hello", b"password", &fast(), &salt, &other_nonce, ts)
                .unwrap();
        assert_ne!(e1.ciphertext, e3.ciphertext);
    }

    #[test]
    fn test_metadata_recorded() {
        let options = EncryptOptions {
            include_metadata: true,
            ..fast()
        };
        let armored = encrypt_note("note with metadata", PASSWORD, &options).unwrap();
        let envelope = envelope::decode(&armored).unwrap();

        let metadata = envelope.metadata.expect("metadata should be present");
        assert_eq!(metadata.algorithm, "AES-GCM");
        assert_eq!(metadata.key_length, 256);
        assert_eq!(metadata.iterations, 1_000);
        assert!(metadata.compressed);
        assert!(metadata.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.timestamp).is_ok());

        assert_eq!(
            decrypt_note(&armored, PASSWORD).unwrap(),
            "note with metadata"
        );
    }

    #[test]
    fn test_uncompressed_fallback_is_recorded() {
        // What prepare() hands back when the compressor fails.
        let prepared = Prepared::Uncompressed(b"fallback note".to_vec());
        let options = EncryptOptions {
            compress: true,
            include_metadata: true,
            ..fast()
        };
        let sealed = seal_prepared(
            &prepared,
            13,
            PASSWORD.as_bytes(),
            &options,
            &[5u8; SALT_LEN],
            &[6u8; NONCE_LEN],
            "2024-05-01T12:00:00.000Z",
        )
        .unwrap();

        assert!(!sealed.compressed);
        assert_eq!(sealed.metadata.as_ref().map(|m| m.compressed), Some(false));

        let armored = envelope::encode(&sealed).unwrap();
        assert_eq!(decrypt_note(&armored, PASSWORD).unwrap(), "fallback note");
    }

    #[test]
    fn test_no_metadata_by_default() {
        let armored = encrypt_note("note", PASSWORD, &fast()).unwrap();
        assert!(envelope::decode(&armored).unwrap().metadata.is_none());
    }

    #[test]
    fn test_iteration_limit() {
        let armored = encrypt_note("note", PASSWORD, &fast()).unwrap();
        let limits = Limits {
            max_iterations: 999,
            ..Limits::default()
        };
        let err = decrypt_note_with_limits(&armored, PASSWORD, &limits).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameter));
    }

    #[test]
    fn test_plaintext_limit() {
        let text = "a".repeat(10_000);
        let limits = Limits {
            max_plaintext_len: 1_000,
            ..Limits::default()
        };

        for compress in [true, false] {
            let options = EncryptOptions { compress, ..fast() };
            let armored = encrypt_note(&text, PASSWORD, &options).unwrap();
            let err =
                decrypt_note_with_limits(&armored, PASSWORD, &limits).expect_err("expected error");
            assert_eq!(err.kind, Some(ErrorKind::InvalidParameter));
        }
    }

    #[test]
    fn test_non_utf8_payload_rejected_as_note() {
        let envelope = encrypt_bytes(&[0xff, 0xfe], PASSWORD.as_bytes(), &fast()).unwrap();
        let armored = envelope::encode(&envelope).unwrap();
        let err = decrypt_note(&armored, PASSWORD).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }
}
