//! Transport collaborator.
//!
//! Delivery and public-key fetch against a resolved overlay location. The
//! wire plumbing, address resolution, and per-call timeout policy live
//! outside the engine; a failed or timed-out call surfaces here as
//! [`crate::Error::Transport`].

use crate::error::Result;
use crate::identity::Location;
use async_trait::async_trait;

/// Node-to-node delivery and key retrieval.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver an opaque payload to a node at `location`.
    async fn send_to_location(&self, location: &Location, payload: &[u8]) -> Result<()>;

    /// Fetch the base64 public key material published by the node at
    /// `location`. `Ok(None)` means the node answered but has no key.
    async fn fetch_public_key(&self, location: &Location) -> Result<Option<String>>;
}
