//! notecrypt - password-based note encryption using PBKDF2 and AES-256-GCM
//!
//! The engine is a set of stateless functions. [`note::encrypt_note`] and
//! [`note::decrypt_note`] are the entry points; [`kdf`], [`payload`],
//! [`cipher`] and [`envelope`] are the stages they compose.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod note;
pub mod password;
pub mod payload;
pub mod strength;

pub use error::{ErrorCategory, ErrorKind, NotecryptError, Result};
pub use note::{EncryptOptions, Limits, decrypt_note, encrypt_note};
