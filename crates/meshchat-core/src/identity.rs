//! Node identity and addressing.
//!
//! Every node is identified by a stable [`ContactId`] and addressed through
//! a mutable overlay [`Location`]. Identity is the id; the location may
//! change when a node moves and must be re-resolved from the contact store
//! rather than cached indefinitely.
//!
//! The [`NodeIdentity`] context object carries the local node's own id and
//! location. It is passed explicitly into every component that needs it;
//! there is no ambient global identity.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identifier of a node/contact on the overlay network.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(String);

impl ContactId {
    /// Create a contact id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContactId({})", self.0)
    }
}

/// Overlay-network address of a node.
///
/// Mutable: a contact may move. Address resolution itself is external to
/// this engine; a location is an opaque string handed to the transport.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location(String);

impl Location {
    /// Create a location.
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Get the location as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({})", crate::logging::RedactedLocation(&self.0))
    }
}

/// The local node's identity context.
///
/// Constructed once at startup and passed into the engine components.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    /// The local node's contact id.
    pub id: ContactId,
    /// The local node's own overlay location.
    pub location: Location,
}

impl NodeIdentity {
    /// Create an identity context.
    pub fn new(id: ContactId, location: Location) -> Self {
        Self { id, location }
    }
}

/// Compute the SHA-256 fingerprint of a public key.
///
/// Returns a hex-encoded string that users can compare out-of-band to
/// verify they are talking to the intended peer.
pub fn compute_fingerprint(public_key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Format a fingerprint for human-readable display.
///
/// Splits into groups of 4 characters for easier verbal comparison.
pub fn format_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .as_bytes()
        .chunks(4)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ")
}
