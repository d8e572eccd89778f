//! AES-256-GCM sealing and opening of prepared payloads
//!
//! Sealed output is the ciphertext followed by the 16-byte GCM tag.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::error::{ErrorCategory, ErrorKind, NotecryptError, Result};
use crate::kdf::DerivedKey;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the authentication tag in bytes
pub const TAG_LEN: usize = 16;

fn cipher_for(key: &DerivedKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt `plaintext`, authenticating `aad` alongside it.
pub fn seal(key: &DerivedKey, nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(NotecryptError::invalid_parameter(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LEN,
            nonce.len()
        )));
    }

    cipher_for(key)
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| {
            NotecryptError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "encryption failed",
            )
        })
}

/// Decrypt and verify a sealed payload.
///
/// Every failure, including a malformed nonce, is reported as
/// [`ErrorKind::AuthenticationFailure`].
pub fn open(key: &DerivedKey, nonce: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN || sealed.len() < TAG_LEN {
        return Err(NotecryptError::authentication_failure());
    }

    cipher_for(key)
        .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad })
        .map_err(|_| NotecryptError::authentication_failure())
}
