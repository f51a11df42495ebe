//! Error types for the meshchat engine.
//!
//! One crate-wide taxonomy. Admission and verification failures are
//! terminal for the inbound message that caused them; storage errors are
//! wrapped and surfaced to the caller; per-recipient delivery failures
//! during fan-out are reported through a delivery report, not this type.

use thiserror::Error;

/// Core error type for meshchat operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A chat, contact, or key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A system message arrived from a sender that is not the chat admin.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The sender is on the blocked-contact list.
    #[error("sender is blocked")]
    Blocked(String),

    /// A signature was missing, malformed, or did not verify.
    #[error("signature verification failed")]
    VerificationFailed(String),

    /// The local private key is absent. Signing is a fatal send
    /// precondition and is never silently skipped.
    #[error("no local private key")]
    NoPrivateKey,

    /// A concurrent mutation was detected on the same chat.
    #[error("concurrent mutation detected")]
    Conflict(String),

    /// Delivery or key fetch failed at the network layer.
    #[error("transport error")]
    Transport(String),

    /// Storage operation failed.
    #[error("storage error")]
    Storage(String),

    /// Encoding/decoding error.
    #[error("encoding error")]
    Encoding(String),
}

/// Result type alias using meshchat's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
