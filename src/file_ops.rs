//! Note file encryption/decryption operations
//!
//! This module provides high-level file operations for encrypting, decrypting,
//! updating and inspecting notes stored in the armored envelope format.

use crate::envelope::{self, Envelope, Metadata};
use crate::error::{ErrorCategory, ErrorKind, NotecryptError, Result};
use crate::note::{self, EncryptOptions, Limits};
use crate::password::PasswordSource;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Encrypt a note file with a password
///
/// Reads a UTF-8 note from `input_path`, encrypts it using a password from
/// `password_source`, and writes the armored envelope to `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    password_source: &mut dyn PasswordSource,
    options: &EncryptOptions,
) -> Result<()> {
    let plaintext = read_note(input_path)?;
    let password = password_source.read_password()?;
    note::check_password(&password)?;

    let envelope = note::encrypt_bytes(plaintext.as_bytes(), &password, options)
        .map_err(|e| e.with_context("encryption failed"))?;
    let armored = envelope::encode(&envelope)?;
    write_file_secure(output_path, armored.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;

    info!(
        output = %output_path.display(),
        iterations = envelope.iterations,
        compressed = envelope.compressed,
        "encrypted note"
    );
    Ok(())
}

/// Decrypt a note file with a password
///
/// Reads an armored envelope from `input_path`, decrypts it using a password from
/// `password_source`, and writes the note to `output_path`. Nothing is
/// written unless decryption succeeds.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn decrypt_file(
    input_path: &Path,
    output_path: &Path,
    password_source: &mut dyn PasswordSource,
    limits: &Limits,
) -> Result<()> {
    let envelope = read_envelope(input_path)?;
    let password = password_source.read_password()?;
    let plaintext = note::decrypt_bytes(&envelope, &password, limits)
        .map_err(|e| e.with_context("failed to decrypt"))?;
    write_file_secure(output_path, &plaintext)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;

    info!(output = %output_path.display(), "decrypted note");
    Ok(())
}

/// Update an encrypted note with new text using the same password
///
/// This function:
/// 1. Decrypts the existing file at `crypt_path` to validate the password
/// 2. Reads the new note from `plain_path`
/// 3. Encrypts it with the validated password, keeping the existing
///    iteration count, compression and metadata settings
/// 4. Atomically writes to `crypt_path` (tempfile + fsync + rename)
///
/// The atomic write ensures that either the old file or the new file exists,
/// never a partial/corrupted file.
///
/// The password validation prevents accidental password changes.
pub fn update_file(
    plain_path: &Path,
    crypt_path: &Path,
    password_source: &mut dyn PasswordSource,
    limits: &Limits,
) -> Result<()> {
    let existing = read_envelope(crypt_path)?;
    let password = password_source.read_password()?;

    // Validate password by decrypting existing file (discard plaintext)
    note::decrypt_bytes(&existing, &password, limits)
        .map_err(|e| e.with_context("failed to decrypt"))?;

    // Great, let's re-write it (atomically).
    let crypt_dir = crypt_path.parent().ok_or_else(|| {
        NotecryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::Io,
            "crypt_path has no parent directory",
        )
    })?;
    let mut temp_file = tempfile::NamedTempFile::new_in(crypt_dir)
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to create tempfile", e))?;

    let new_plaintext = read_note(plain_path)?;
    let options = EncryptOptions {
        iterations: existing.iterations,
        compress: existing.compressed,
        include_metadata: existing.metadata.is_some(),
    };
    let new_envelope = note::encrypt_bytes(new_plaintext.as_bytes(), &password, &options)
        .map_err(|e| e.with_context("failed to encrypt"))?;
    let new_armored = envelope::encode(&new_envelope)?;

    temp_file
        .write_all(new_armored.as_bytes())
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to flush tempfile", e))?;
    temp_file.as_file().sync_all().map_err(|e| {
        io_error(
            ErrorCategory::Internal,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    // Atomically rename temp file to target (persist with restrictive permissions)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| io_error(ErrorCategory::Internal, "failed to get tempfile metadata", e))?
            .permissions();
        perms.set_mode(0o600);
        temp_file.as_file().set_permissions(perms).map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                "failed to set tempfile permissions",
                e,
            )
        })?;
    }
    temp_file.persist(crypt_path).map_err(|e| {
        NotecryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", crypt_path.display()),
            e,
        )
    })?;

    info!(output = %crypt_path.display(), "updated note");
    Ok(())
}

/// Password-free summary of an envelope's header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub version: u64,
    pub iterations: u32,
    pub compressed: bool,
    /// Size of ciphertext plus authentication tag.
    pub sealed_len: usize,
    pub metadata: Option<Metadata>,
}

impl From<&Envelope> for Inspection {
    fn from(envelope: &Envelope) -> Self {
        Self {
            version: envelope::VERSION,
            iterations: envelope.iterations,
            compressed: envelope.compressed,
            sealed_len: envelope.ciphertext.len(),
            metadata: envelope.metadata.clone(),
        }
    }
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version:     {}", self.version)?;
        writeln!(f, "Iterations:  {}", self.iterations)?;
        writeln!(
            f,
            "Compressed:  {}",
            if self.compressed { "Yes" } else { "No" }
        )?;
        write!(f, "Sealed size: {} bytes", self.sealed_len)?;
        if let Some(m) = &self.metadata {
            writeln!(f)?;
            writeln!(f, "Metadata (advisory):")?;
            writeln!(f, "  Created:    {}", m.timestamp)?;
            writeln!(f, "  Algorithm:  {}", m.algorithm)?;
            writeln!(f, "  Key length: {} bits", m.key_length)?;
            writeln!(f, "  Iterations: {}", m.iterations)?;
            write!(
                f,
                "  Compressed: {}",
                if m.compressed { "Yes" } else { "No" }
            )?;
        }
        Ok(())
    }
}

/// Describe an encrypted note without decrypting it.
pub fn inspect_file(input_path: &Path) -> Result<Inspection> {
    let envelope = read_envelope(input_path)?;
    Ok(Inspection::from(&envelope))
}

fn read_note(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    let text = String::from_utf8(bytes).map_err(|e| {
        NotecryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidParameter,
            format!("{} is not a UTF-8 text file", path.display()),
            e,
        )
    })?;
    if text.is_empty() {
        return Err(NotecryptError::invalid_parameter(format!(
            "{} is empty; there is nothing to encrypt",
            path.display()
        )));
    }
    Ok(text)
}

fn read_envelope(path: &Path) -> Result<Envelope> {
    let armored_bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    let armored = String::from_utf8(armored_bytes).map_err(|e| {
        NotecryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedEnvelope,
            "encrypted file is not valid UTF-8",
            e,
        )
    })?;
    envelope::decode(&armored).map_err(|e| e.with_context("failed to parse encrypted note"))
}

/// Write file with secure permissions (0o600 on Unix)
fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| io_error(ErrorCategory::User, format!("failed to open {}", path.display()), e))?;

        file.write_all(contents).map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents).map_err(|e| {
            io_error(
                ErrorCategory::User,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }
}

fn io_error(category: ErrorCategory, msg: impl Into<String>, err: io::Error) -> NotecryptError {
    NotecryptError::with_kind_and_source(category, ErrorKind::Io, msg, err)
}

fn read_error(path: &Path, err: io::Error) -> NotecryptError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    io_error(category, format!("failed to read from {}", path.display()), err)
}
