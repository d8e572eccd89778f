//! Password-based key derivation using PBKDF2-HMAC-SHA256
//!
//! Keys are 256 bits, bound to exactly one (password, salt, iterations)
//! triple, and are wiped from memory when dropped.

use std::fmt;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{NotecryptError, Result};

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of derived key in bytes
pub const KEY_LEN: usize = 32;

/// Iteration count used when the caller does not pick one
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Named iteration counts offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum IterationPreset {
    /// 50,000 iterations
    Fast,
    /// 100,000 iterations
    Standard,
    /// 200,000 iterations
    Secure,
    /// 500,000 iterations
    Paranoid,
}

impl IterationPreset {
    pub fn iterations(self) -> u32 {
        match self {
            IterationPreset::Fast => 50_000,
            IterationPreset::Standard => DEFAULT_ITERATIONS,
            IterationPreset::Secure => 200_000,
            IterationPreset::Paranoid => 500_000,
        }
    }
}

/// Symmetric key material produced by [`derive_key`].
///
/// Never serialized and never cached; it lives for a single encrypt or
/// decrypt call.
pub struct DerivedKey(Zeroizing<[u8; KEY_LEN]>);

impl DerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Derive a 32-byte key from a password and salt.
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> Result<DerivedKey> {
    if iterations == 0 {
        return Err(NotecryptError::invalid_parameter(
            "iteration count must be positive",
        ));
    }
    if salt.len() != SALT_LEN {
        return Err(NotecryptError::invalid_parameter(format!(
            "salt must be {} bytes, got {}",
            SALT_LEN,
            salt.len()
        )));
    }

    debug!(iterations, "deriving key");
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password, salt, iterations, key.as_mut_slice());

    Ok(DerivedKey(key))
}
