//! Error types for stamping and publishing.
//!
//! Every fallible operation in the crate returns [`Error`]. The variants form a
//! closed set so callers can decide on user-facing messaging by matching on
//! [`Error::category`] instead of inspecting message text.

use crate::portal::storage::StorageError;

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while stamping a document or publishing a case.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Document is encrypted and the empty password did not open it
    #[error("Document is password protected and no password was supplied")]
    PasswordRequired,

    /// A supplied password could not decrypt the document
    #[error("Cannot decrypt document: {0}")]
    IncorrectPassword(String),

    /// Document uses an encryption scheme that cannot be decrypted
    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// Source bytes are not a usable PDF
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Document has no page to stamp
    #[error("Document has no pages")]
    NoPages,

    /// The QR raster could not be embedded
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    /// QR code could not be generated
    #[error("Barcode error: {0}")]
    Barcode(String),

    /// Writing the stamped document failed
    #[error("Failed to serialize document: {0}")]
    Serialization(String),

    /// Object store or table failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Upload rejected before it was attempted
    #[error("File is {size} bytes, limit is {limit} bytes")]
    FileTooLarge {
        /// Size of the rejected file
        size: u64,
        /// Configured limit
        limit: u64,
    },

    /// Required form input is missing
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// No signed-in session
    #[error("Not signed in")]
    Unauthenticated,

    /// Workflow event not valid in the current state
    #[error("Invalid transition: {event} while {state}")]
    InvalidTransition {
        /// State name at the time of the event
        state: &'static str,
        /// Rejected event name
        event: &'static str,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad failure classes used by callers to pick a message and a retry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// User can retry with a (different) password
    Decryption,
    /// User can retry with different files or input
    MalformedInput,
    /// Producing the output failed; nothing was written
    Serialization,
    /// Backend failure; retry later
    Storage,
    /// Caller drove the workflow out of order
    Workflow,
}

impl Error {
    /// Classify this error.
    pub fn category(&self) -> FailureCategory {
        match self {
            Error::PasswordRequired | Error::IncorrectPassword(_) => FailureCategory::Decryption,
            Error::MalformedDocument(_)
            | Error::UnsupportedEncryption(_)
            | Error::NoPages
            | Error::UnsupportedImage(_)
            | Error::Barcode(_)
            | Error::FileTooLarge { .. }
            | Error::MissingField(_)
            | Error::Config(_) => FailureCategory::MalformedInput,
            Error::Serialization(_) | Error::Io(_) => FailureCategory::Serialization,
            Error::Storage(_) => FailureCategory::Storage,
            Error::Unauthenticated | Error::InvalidTransition { .. } => FailureCategory::Workflow,
        }
    }

    /// Whether the caller should ask the user for a password and retry.
    pub fn needs_password(&self) -> bool {
        self.category() == FailureCategory::Decryption
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decryption_errors_are_user_actionable() {
        assert!(Error::PasswordRequired.needs_password());
        assert!(Error::IncorrectPassword("bad key".into()).needs_password());
        assert!(!Error::NoPages.needs_password());
        assert!(!Error::UnsupportedEncryption("/V 3".into()).needs_password());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::MalformedDocument("x".into()).category(),
            FailureCategory::MalformedInput
        );
        assert_eq!(
            Error::UnsupportedImage("gif".into()).category(),
            FailureCategory::MalformedInput
        );
        assert_eq!(Error::Serialization("disk".into()).category(), FailureCategory::Serialization);
        assert_eq!(
            Error::InvalidTransition {
                state: "idle",
                event: "confirm"
            }
            .category(),
            FailureCategory::Workflow
        );
    }

    #[test]
    fn test_file_too_large_message() {
        let err = Error::FileTooLarge {
            size: 60,
            limit: 50,
        };
        let msg = err.to_string();
        assert!(msg.contains("60"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
