//! In-memory store implementation.
//!
//! Backs every collaborator trait with plain maps. Used by tests and by
//! embedders that do not need durability.

use crate::crypto::{KeyKind, KeyRecord};
use crate::error::{Error, Result};
use crate::identity::ContactId;
use crate::messaging::{Chat, ChatId, Contact};
use crate::storage::{BlockedContactStore, ChatStore, ContactStore, FileStore, KeyStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    chats: BTreeMap<ChatId, Chat>,
    contacts: HashMap<ContactId, Contact>,
    pending: HashMap<ContactId, Contact>,
    keys: HashMap<(ContactId, KeyKind), KeyRecord>,
    blocked: BTreeSet<ContactId>,
    files: HashMap<String, Vec<u8>>,
}

/// Volatile store implementing all collaborator traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn chat(&self, id: &ChatId) -> Result<Option<Chat>> {
        Ok(self.inner.read().await.chats.get(id).cloned())
    }

    async fn save_chat(&self, chat: &Chat) -> Result<()> {
        self.inner
            .write()
            .await
            .chats
            .insert(chat.id.clone(), chat.clone());
        Ok(())
    }

    async fn remove_chat(&self, id: &ChatId) -> Result<()> {
        self.inner.write().await.chats.remove(id);
        Ok(())
    }

    async fn chats(&self, offset: usize, count: usize) -> Result<Vec<Chat>> {
        Ok(self
            .inner
            .read()
            .await
            .chats
            .values()
            .skip(offset)
            .take(count)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn contact(&self, id: &ContactId) -> Result<Option<Contact>> {
        Ok(self.inner.read().await.contacts.get(id).cloned())
    }

    async fn save_contact(&self, contact: &Contact) -> Result<()> {
        self.inner
            .write()
            .await
            .contacts
            .insert(contact.id.clone(), contact.clone());
        Ok(())
    }

    async fn save_pending_request(&self, contact: &Contact) -> Result<()> {
        self.inner
            .write()
            .await
            .pending
            .insert(contact.id.clone(), contact.clone());
        Ok(())
    }

    async fn pending_request(&self, id: &ContactId) -> Result<Option<Contact>> {
        Ok(self.inner.read().await.pending.get(id).cloned())
    }

    async fn clear_pending_request(&self, id: &ContactId) -> Result<()> {
        self.inner.write().await.pending.remove(id);
        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn private_key(&self, owner: &ContactId) -> Result<Option<KeyRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .keys
            .get(&(owner.clone(), KeyKind::Private))
            .cloned())
    }

    async fn public_key(&self, owner: &ContactId) -> Result<Option<KeyRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .keys
            .get(&(owner.clone(), KeyKind::Public))
            .cloned())
    }

    async fn save_key(&self, record: &KeyRecord) -> Result<()> {
        self.inner
            .write()
            .await
            .keys
            .insert((record.owner.clone(), record.kind), record.clone());
        Ok(())
    }
}

#[async_trait]
impl BlockedContactStore for MemoryStore {
    async fn list_blocked(&self, offset: usize, count: usize) -> Result<Vec<ContactId>> {
        Ok(self
            .inner
            .read()
            .await
            .blocked
            .iter()
            .skip(offset)
            .take(count)
            .cloned()
            .collect())
    }

    async fn block(&self, id: &ContactId) -> Result<()> {
        self.inner.write().await.blocked.insert(id.clone());
        Ok(())
    }

    async fn unblock(&self, id: &ContactId) -> Result<()> {
        self.inner.write().await.blocked.remove(id);
        Ok(())
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.inner
            .write()
            .await
            .files
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.inner
            .read()
            .await
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("file {}", path)))
    }
}
