//! Keyed-store collaborators for chats, contacts, keys, and blocked ids.
//!
//! The engine consumes these narrow traits and never assumes anything
//! about the backing store: no transactions, no multi-entity atomicity.
//! Two implementations ship with the crate: [`MemoryStore`] for tests and
//! embedding, and the SQLite-backed [`Database`].

mod database;
mod memory;
mod schema;

pub use database::{Database, DatabaseConfig};
pub use memory::MemoryStore;

use crate::crypto::KeyRecord;
use crate::error::Result;
use crate::identity::ContactId;
use crate::messaging::{Chat, ChatId, Contact};
use async_trait::async_trait;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "meshchat.db";

/// Persistence for chat aggregates.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Load a chat by id.
    async fn chat(&self, id: &ChatId) -> Result<Option<Chat>>;

    /// Persist a chat, replacing any previous state.
    async fn save_chat(&self, chat: &Chat) -> Result<()>;

    /// Remove a chat. Local-only; never propagates to other nodes.
    async fn remove_chat(&self, id: &ChatId) -> Result<()>;

    /// List chats, paginated.
    async fn chats(&self, offset: usize, count: usize) -> Result<Vec<Chat>>;
}

/// Persistence for known contacts and pending contact requests.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Load a contact by id.
    async fn contact(&self, id: &ContactId) -> Result<Option<Contact>>;

    /// Persist a contact, replacing any previous record.
    async fn save_contact(&self, contact: &Contact) -> Result<()>;

    /// Record (or refresh) a pending contact request.
    async fn save_pending_request(&self, contact: &Contact) -> Result<()>;

    /// Load a pending contact request, if one exists.
    async fn pending_request(&self, id: &ContactId) -> Result<Option<Contact>>;

    /// Drop a pending contact request after acceptance or rejection.
    async fn clear_pending_request(&self, id: &ContactId) -> Result<()>;
}

/// Persistence for signing keys.
///
/// Exactly one private key exists, owned by the local identity. Public
/// keys accumulate as a cache, one per known contact; the contact's own
/// node stays authoritative.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Load the private key for `owner`, if present.
    async fn private_key(&self, owner: &ContactId) -> Result<Option<KeyRecord>>;

    /// Load the cached public key for `owner`, if present.
    async fn public_key(&self, owner: &ContactId) -> Result<Option<KeyRecord>>;

    /// Persist a key record, replacing any previous one of the same kind.
    async fn save_key(&self, record: &KeyRecord) -> Result<()>;
}

/// The blocked-contact set, listed in pages.
#[async_trait]
pub trait BlockedContactStore: Send + Sync {
    /// List blocked contact ids, paginated.
    async fn list_blocked(&self, offset: usize, count: usize) -> Result<Vec<ContactId>>;

    /// Add a contact to the blocked set.
    async fn block(&self, id: &ContactId) -> Result<()>;

    /// Remove a contact from the blocked set.
    async fn unblock(&self, id: &ContactId) -> Result<()>;
}

/// Opaque blob storage for file payloads.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write a blob under `path`.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read the blob stored under `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
}
