//! Where note passwords come from
//!
//! A [`PasswordSource`] yields the raw password bytes for one operation.
//! Sources that feed encryption are wrapped in [`NewPassword`], which
//! enforces the minimum length and reports the strength estimate before
//! any key is derived.

use std::io::{self, IsTerminal, Read};

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, NotecryptError, Result};
use crate::note;
use crate::strength::{self, Strength, StrengthLevel};

/// Password bytes, wiped on drop. Not necessarily UTF-8.
pub type Password = Zeroizing<Vec<u8>>;

pub trait PasswordSource {
    fn read_password(&mut self) -> Result<Password>;
}

impl<S: PasswordSource + ?Sized> PasswordSource for Box<S> {
    fn read_password(&mut self) -> Result<Password> {
        (**self).read_password()
    }
}

/// A password known up front, e.g. from a test or an embedding caller.
pub struct FixedPassword(Password);

impl FixedPassword {
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(password.into()))
    }
}

impl PasswordSource for FixedPassword {
    fn read_password(&mut self) -> Result<Password> {
        Ok(self.0.clone())
    }
}

/// Reads a password from a stream until EOF.
///
/// One trailing line ending (`\n` or `\r\n`) is dropped, so
/// `echo "$PW" | notecrypt --password-stdin ...` and `printf %s "$PW" | ...`
/// derive the same key. Any other whitespace is part of the password.
pub struct StreamPassword<R> {
    stream: R,
}

impl<R: Read> StreamPassword<R> {
    pub fn new(stream: R) -> Self {
        Self { stream }
    }
}

impl<R: Read> PasswordSource for StreamPassword<R> {
    fn read_password(&mut self) -> Result<Password> {
        let mut data = Zeroizing::new(Vec::new());
        self.stream.read_to_end(&mut data).map_err(|e| {
            NotecryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to read password",
                e,
            )
        })?;

        if data.last() == Some(&b'\n') {
            data.pop();
            if data.last() == Some(&b'\r') {
                data.pop();
            }
        }
        Ok(data)
    }
}

/// Prompts on the controlling terminal without echo.
///
/// Terminal input is always UTF-8; use `--password-stdin` for anything else.
pub struct TerminalPassword {
    confirm: bool,
}

impl TerminalPassword {
    /// Ask once. Used to open existing notes.
    pub fn new() -> Self {
        Self { confirm: false }
    }

    /// Ask twice and require both entries to match. Used when a note is
    /// encrypted, where a typo would lock the note for good.
    pub fn confirming() -> Self {
        Self { confirm: true }
    }

    fn prompt(prompt: &str) -> Result<Password> {
        rpassword::prompt_password(prompt)
            .map(|s| Zeroizing::new(s.into_bytes()))
            .map_err(|e| {
                NotecryptError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::PasswordUnavailable,
                    "failed to read password from terminal",
                    e,
                )
            })
    }
}

impl Default for TerminalPassword {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordSource for TerminalPassword {
    fn read_password(&mut self) -> Result<Password> {
        if !io::stdin().is_terminal() {
            return Err(NotecryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::PasswordUnavailable,
                "stdin is not a terminal; pass --password-stdin to pipe the password in",
            ));
        }

        let password = Self::prompt("Password (notecrypt): ")?;
        if self.confirm {
            let again = Self::prompt("Confirm password: ")?;
            if *again != *password {
                return Err(NotecryptError::invalid_parameter("passwords do not match"));
            }
        }
        Ok(password)
    }
}

/// A password that is about to protect a note.
///
/// Rejects passwords below the minimum length, then logs the strength
/// estimate: a warning below [`StrengthLevel::Strong`], info otherwise.
pub struct NewPassword<S> {
    inner: S,
    strength: Option<Strength>,
}

impl<S: PasswordSource> NewPassword<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            strength: None,
        }
    }

    /// Estimate for the last password read, if it was UTF-8.
    pub fn strength(&self) -> Option<Strength> {
        self.strength
    }
}

impl<S: PasswordSource> PasswordSource for NewPassword<S> {
    fn read_password(&mut self) -> Result<Password> {
        let password = self.inner.read_password()?;
        note::check_password(&password)?;

        self.strength = std::str::from_utf8(&password).ok().map(strength::estimate);
        match self.strength {
            Some(s) if s.level < StrengthLevel::Strong => {
                warn!(score = s.score, "password strength: {}", s.level)
            }
            Some(s) => info!(score = s.score, "password strength: {}", s.level),
            None => info!("password is not UTF-8; strength not estimated"),
        }
        Ok(password)
    }
}
