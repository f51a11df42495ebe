//! Chat aggregate service: resolution, mutation, and pagination.
//!
//! The backing store gives no atomicity across the resolve → mutate →
//! persist cycle, and inbound messages for the same chat arrive
//! concurrently from multiple connections. A per-chat-id async lock
//! serializes that cycle; signature verification and key fetches happen
//! before the lock is taken so network I/O never holds it.

use crate::error::{Error, Result};
use crate::identity::ContactId;
use crate::messaging::chat::{Chat, ChatId, Contact};
use crate::messaging::handlers::{self, HandlerOutcome};
use crate::messaging::message::{Message, MessageId};
use crate::storage::ChatStore;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Default page size for message retrieval.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Pagination request for a chat's message log.
///
/// Two mutually exclusive modes: **cursor** (`from`: messages strictly
/// before a given message id) and **offset** (`page`: the Nth page
/// counting back from the newest message). Offset mode takes precedence
/// when both are supplied.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Cursor mode: return messages strictly before this id.
    pub from: Option<MessageId>,
    /// Offset mode: 0 is the newest page.
    pub page: Option<usize>,
    /// Page size.
    pub count: usize,
}

impl PageRequest {
    /// Newest `count` messages.
    pub fn newest(count: usize) -> Self {
        Self {
            from: None,
            page: None,
            count,
        }
    }

    /// Cursor mode.
    pub fn before(from: MessageId, count: usize) -> Self {
        Self {
            from: Some(from),
            page: None,
            count,
        }
    }

    /// Offset mode.
    pub fn page(page: usize, count: usize) -> Self {
        Self {
            from: None,
            page: Some(page),
            count,
        }
    }
}

/// Owns chat state transitions against the chat store.
pub struct ChatAggregate {
    store: Arc<dyn ChatStore>,
    locks: Mutex<HashMap<ChatId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChatAggregate {
    /// Create an aggregate service over a chat store.
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Load a chat by id.
    ///
    /// Never fabricates state: an unknown id, including a validly derived
    /// 1:1 id whose chat was never created, is `NotFound`. Chat creation
    /// is an explicit operation gated by contact-request acceptance or
    /// group creation.
    pub async fn resolve(&self, id: &ChatId) -> Result<Chat> {
        self.store
            .chat(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat {}", id)))
    }

    /// Acquire the mutation lock for a chat id.
    ///
    /// At most one resolve → mutate → persist cycle runs per chat at a
    /// time. Callers must finish verification before acquiring this.
    pub async fn lock_chat(&self, id: &ChatId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Persist a chat.
    pub async fn persist(&self, chat: &Chat) -> Result<()> {
        self.store.save_chat(chat).await
    }

    /// Create (or return the existing) 1:1 chat with an accepted peer.
    pub async fn create_direct(&self, local: Contact, peer: Contact) -> Result<Chat> {
        let id = ChatId::direct(&local.id, &peer.id);
        let _guard = self.lock_chat(&id).await;
        if let Some(existing) = self.store.chat(&id).await? {
            return Ok(existing);
        }
        let chat = Chat::direct(local, peer);
        self.store.save_chat(&chat).await?;
        debug!(chat_id = %chat.id, "created direct chat");
        Ok(chat)
    }

    /// Create a group chat with `admin` as the managing member.
    pub async fn create_group(
        &self,
        name: impl Into<String>,
        admin: Contact,
        members: Vec<Contact>,
    ) -> Result<Chat> {
        let mut raw = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let id = ChatId::new(format!("g-{}", hex::encode(raw)));
        let chat = Chat::group(id, name, admin, members);
        self.store.save_chat(&chat).await?;
        debug!(chat_id = %chat.id, members = chat.contacts.len(), "created group chat");
        Ok(chat)
    }

    /// Delete a chat locally. Never propagates to other nodes.
    pub async fn delete_chat(&self, id: &ChatId) -> Result<()> {
        let _guard = self.lock_chat(id).await;
        self.store.remove_chat(id).await
    }

    /// Append a content message to a chat's log.
    pub async fn append(&self, chat_id: &ChatId, message: Message) -> Result<Chat> {
        let _guard = self.lock_chat(chat_id).await;
        let mut chat = self.resolve(chat_id).await?;
        if handlers::append_content(message, &mut chat).mutated() {
            self.persist(&chat).await?;
        }
        Ok(chat)
    }

    /// Remove a member from a chat.
    pub async fn remove_member(&self, chat_id: &ChatId, contact_id: &ContactId) -> Result<Chat> {
        let _guard = self.lock_chat(chat_id).await;
        let mut chat = self.resolve(chat_id).await?;
        if chat.remove_contact(contact_id) {
            self.persist(&chat).await?;
        }
        Ok(chat)
    }

    /// Advance a read cursor under the monotonicity rule.
    ///
    /// Returns the chat and whether the cursor moved; stale receipts are
    /// discarded without error.
    pub async fn record_read(
        &self,
        chat_id: &ChatId,
        contact_id: &ContactId,
        message_id: &MessageId,
    ) -> Result<(Chat, bool)> {
        let _guard = self.lock_chat(chat_id).await;
        let mut chat = self.resolve(chat_id).await?;
        let moved = chat.record_read(contact_id, message_id);
        if moved {
            self.persist(&chat).await?;
        }
        Ok((chat, moved))
    }

    /// Apply an inbound message under the chat lock and persist when the
    /// handler mutated the chat. Re-resolves inside the lock so dispatch
    /// always sees the latest persisted state.
    pub async fn apply(&self, message: Message, now: i64) -> Result<(Chat, HandlerOutcome)> {
        let chat_id = message.to.clone();
        let _guard = self.lock_chat(&chat_id).await;
        let mut chat = self.resolve(&chat_id).await?;
        let outcome = handlers::dispatch(message, &mut chat, now)?;
        if outcome.mutated() {
            self.persist(&chat).await?;
        }
        Ok((chat, outcome))
    }

    /// Store a draft message on its chat.
    pub async fn save_draft(&self, chat_id: &ChatId, message: Message) -> Result<Chat> {
        let _guard = self.lock_chat(chat_id).await;
        let mut chat = self.resolve(chat_id).await?;
        match chat.draft.iter_mut().find(|d| d.id == message.id) {
            Some(existing) => *existing = message,
            None => chat.draft.push(message),
        }
        self.persist(&chat).await?;
        Ok(chat)
    }

    /// Drop a draft message from its chat.
    pub async fn discard_draft(&self, chat_id: &ChatId, draft_id: &MessageId) -> Result<Chat> {
        let _guard = self.lock_chat(chat_id).await;
        let mut chat = self.resolve(chat_id).await?;
        let before = chat.draft.len();
        chat.draft.retain(|d| &d.id != draft_id);
        if chat.draft.len() != before {
            self.persist(&chat).await?;
        }
        Ok(chat)
    }

    /// Page through a chat's message log.
    pub fn messages_page(chat: &Chat, request: &PageRequest) -> Vec<Message> {
        let count = if request.count == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            request.count
        };
        let len = chat.messages.len();

        // Offset mode takes precedence over the cursor when both are set.
        let end = if let Some(page) = request.page {
            len.saturating_sub(page.saturating_mul(count))
        } else if let Some(from) = &request.from {
            match chat.messages.iter().position(|m| &m.id == from) {
                Some(index) => index,
                None => {
                    debug!(chat_id = %chat.id, cursor = %from, "page cursor not found");
                    return Vec::new();
                }
            }
        } else {
            len
        };
        let start = end.saturating_sub(count);
        chat.messages[start..end].to_vec()
    }
}
