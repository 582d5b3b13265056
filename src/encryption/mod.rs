//! Opening encrypted source documents.
//!
//! Documents protected only by an owner password decrypt with the empty user
//! password, so that is always tried first. The caller is asked for a
//! password only when the empty one fails.
//!
//! The standard security handler is supported for revisions 2 to 6: RC4
//! (40 to 128 bit), AES-128 (`/AESV2`) and AES-256 (`/AESV3`). Anything else
//! fails with [`Error::UnsupportedEncryption`] without asking for a password.
//!
//! ```ignore
//! use qr_stamp::encryption::{unlock, StaticPassword};
//!
//! let mut doc = lopdf::Document::load_mem(&bytes)?;
//! unlock(&mut doc, &mut StaticPassword::new("secret"))?;
//! ```

mod algorithms;
mod cipher;
mod handler;

use std::fmt;

use lopdf::Document;

pub use handler::{CryptMethod, SecurityHandler};

use crate::error::{Error, Result};

/// Why a decryption attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptFailure {
    /// The password is neither the user nor the owner password
    WrongPassword,
    /// The document uses a scheme this crate cannot decrypt
    Unsupported(String),
}

impl fmt::Display for DecryptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptFailure::WrongPassword => write!(f, "password does not match"),
            DecryptFailure::Unsupported(reason) => write!(f, "unsupported encryption: {}", reason),
        }
    }
}

/// A document that may need decrypting before it can be edited.
pub trait Decryptable {
    /// Whether the document still carries an encryption dictionary.
    fn is_encrypted(&self) -> bool;

    /// Attempt decryption with `password`. On failure the document is left
    /// untouched.
    fn try_decrypt(&mut self, password: &str) -> std::result::Result<(), DecryptFailure>;
}

impl Decryptable for Document {
    fn is_encrypted(&self) -> bool {
        Document::is_encrypted(self)
    }

    fn try_decrypt(&mut self, password: &str) -> std::result::Result<(), DecryptFailure> {
        let handler = SecurityHandler::from_document(self)?;
        let key = handler.authenticate(password.as_bytes())?;
        log::debug!("Decrypting with {:?} (/V {})", handler.methods(), handler.version());

        // Decryption rewrites objects in place; work on a copy so a corrupt
        // object cannot leave the document half-decrypted.
        let mut candidate = self.clone();
        handler.decrypt_document(&mut candidate, &key)?;
        *self = candidate;
        Ok(())
    }
}

/// Source of a user-supplied password.
pub trait PasswordPrompt {
    /// Return a password to try, or `None` if the user declined.
    fn request_password(&mut self) -> Option<String>;
}

/// Never supplies a password.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl PasswordPrompt for NoPrompt {
    fn request_password(&mut self) -> Option<String> {
        None
    }
}

/// Supplies a fixed password (CLI flag, stored form value).
#[derive(Debug, Clone)]
pub struct StaticPassword(String);

impl StaticPassword {
    /// Create a prompt that answers with `password`.
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }
}

impl PasswordPrompt for StaticPassword {
    fn request_password(&mut self) -> Option<String> {
        Some(self.0.clone())
    }
}

impl<F> PasswordPrompt for F
where
    F: FnMut() -> Option<String>,
{
    fn request_password(&mut self) -> Option<String> {
        self()
    }
}

/// Decrypt `doc` if needed.
///
/// Order: not encrypted → done; empty password; then one password from
/// `prompt`. Fails with [`Error::PasswordRequired`] when the prompt declines,
/// [`Error::IncorrectPassword`] when its password does not work, and
/// [`Error::UnsupportedEncryption`] when the scheme cannot be decrypted at all.
pub fn unlock<D: Decryptable + ?Sized>(doc: &mut D, prompt: &mut dyn PasswordPrompt) -> Result<()> {
    if !doc.is_encrypted() {
        return Ok(());
    }

    match doc.try_decrypt("") {
        Ok(()) => {
            log::info!("Opened encrypted document with the empty password");
            return Ok(());
        },
        Err(DecryptFailure::Unsupported(reason)) => {
            log::warn!("Cannot decrypt document: {}", reason);
            return Err(Error::UnsupportedEncryption(reason));
        },
        Err(DecryptFailure::WrongPassword) => log::debug!("Empty password rejected"),
    }

    let password = prompt.request_password().ok_or(Error::PasswordRequired)?;
    match doc.try_decrypt(&password) {
        Ok(()) => {
            log::info!("Opened encrypted document with the supplied password");
            Ok(())
        },
        Err(DecryptFailure::Unsupported(reason)) => {
            log::warn!("Cannot decrypt document: {}", reason);
            Err(Error::UnsupportedEncryption(reason))
        },
        Err(failure) => {
            log::warn!("Supplied password rejected");
            Err(Error::IncorrectPassword(failure.to_string()))
        },
    }
}
