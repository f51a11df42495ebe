//! Chat aggregate state: membership, message log, and read cursors.
//!
//! A [`Chat`] is the unit of consistency for one conversation. All
//! mutations happen through the handlers or the aggregate service; this
//! module holds the pure state and its invariants:
//!
//! - 1:1 chats have exactly two members and a deterministic id derived
//!   from the two lowest-sorted participant ids.
//! - Group chats have an admin that is always a member.
//! - The read map only moves forward in time per sender.

use crate::identity::{ContactId, Location};
use crate::messaging::message::{Message, MessageId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier for a chat.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(String);

impl ChatId {
    /// Create a chat id from a raw string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic id for a 1:1 chat between two participants.
    ///
    /// Stable regardless of who initiates: the two ids are sorted and
    /// joined, so both nodes derive the same id independently.
    pub fn direct(a: &ContactId, b: &ContactId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}-{}", low, high))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChatId({})", self.0)
    }
}

/// A known peer: stable id, current overlay location, optional alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Stable identity.
    pub id: ContactId,
    /// Current overlay address. Mutable; re-resolve, do not cache forever.
    pub location: Location,
    /// Optional display alias.
    pub alias: Option<String>,
}

impl Contact {
    /// Create a contact without an alias.
    pub fn new(id: ContactId, location: Location) -> Self {
        Self {
            id,
            location,
            alias: None,
        }
    }

    /// Set the display alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// One conversation: members, admin, message log, read cursors, drafts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    /// Chat identifier.
    pub id: ChatId,
    /// Display name.
    pub name: String,
    /// Members, unique by contact id.
    pub contacts: Vec<Contact>,
    /// Message log in local causal order (append-mostly).
    pub messages: Vec<Message>,
    /// Admin contact id; always a member when `is_group` is set.
    pub admin: Option<ContactId>,
    /// Whether this is an admin-managed group rather than a 1:1 chat.
    pub is_group: bool,
    /// Whether the chat has been accepted locally.
    pub accepted: bool,
    /// Per-sender read cursor: last-read message id.
    pub read: HashMap<ContactId, MessageId>,
    /// Locally composed, unsent messages.
    pub draft: Vec<Message>,
}

impl Chat {
    /// Create a 1:1 chat between the local node and an accepted peer.
    pub fn direct(local: Contact, peer: Contact) -> Self {
        let id = ChatId::direct(&local.id, &peer.id);
        let name = peer.alias.clone().unwrap_or_else(|| peer.id.to_string());
        Self {
            id,
            name,
            contacts: vec![local, peer],
            messages: Vec::new(),
            admin: None,
            is_group: false,
            accepted: true,
            read: HashMap::new(),
            draft: Vec::new(),
        }
    }

    /// Create a group chat with `admin` as the managing member.
    ///
    /// The admin is always included in the member set.
    pub fn group(id: ChatId, name: impl Into<String>, admin: Contact, members: Vec<Contact>) -> Self {
        let admin_id = admin.id.clone();
        let mut contacts = vec![admin];
        for member in members {
            if !contacts.iter().any(|c| c.id == member.id) {
                contacts.push(member);
            }
        }
        Self {
            id,
            name: name.into(),
            contacts,
            messages: Vec::new(),
            admin: Some(admin_id),
            is_group: true,
            accepted: true,
            read: HashMap::new(),
            draft: Vec::new(),
        }
    }

    /// Whether `id` is a member of this chat.
    pub fn is_member(&self, id: &ContactId) -> bool {
        self.contacts.iter().any(|c| &c.id == id)
    }

    /// Look up a member's contact record.
    pub fn contact(&self, id: &ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|c| &c.id == id)
    }

    /// Insert or refresh a member record, keeping members unique by id.
    pub fn upsert_contact(&mut self, contact: Contact) {
        match self.contacts.iter_mut().find(|c| c.id == contact.id) {
            Some(existing) => *existing = contact,
            None => self.contacts.push(contact),
        }
    }

    /// Remove a member and its read cursor. Returns whether it was present.
    pub fn remove_contact(&mut self, id: &ContactId) -> bool {
        let before = self.contacts.len();
        self.contacts.retain(|c| &c.id != id);
        self.read.remove(id);
        self.contacts.len() != before
    }

    /// Advance `from`'s read cursor to `target` under the monotonicity rule.
    ///
    /// The cursor moves only if the target message exists in this chat and
    /// its timestamp is no earlier than the currently recorded target's.
    /// Returns whether the cursor was updated; stale or unknown targets are
    /// discarded.
    pub fn record_read(&mut self, from: &ContactId, target: &MessageId) -> bool {
        let Some(target_ts) = self.timestamp_of(target) else {
            return false;
        };
        if let Some(prev) = self.read.get(from) {
            if let Some(prev_ts) = self.timestamp_of(prev) {
                if target_ts < prev_ts {
                    return false;
                }
            }
        }
        self.read.insert(from.clone(), *target);
        true
    }

    /// Find a top-level message by id.
    pub fn find_message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Find a message by id for mutation: the top-level log first, then one
    /// level into the replies of `reply_parent` when given.
    pub fn find_message_mut(
        &mut self,
        id: &MessageId,
        reply_parent: Option<&MessageId>,
    ) -> Option<&mut Message> {
        if self.messages.iter().any(|m| &m.id == id) {
            return self.messages.iter_mut().find(|m| &m.id == id);
        }
        let parent_id = reply_parent?;
        let parent = self.messages.iter_mut().find(|m| &m.id == parent_id)?;
        parent.replies.iter_mut().find(|r| &r.id == id)
    }

    /// Whether a message id exists in the log (top level or one reply level).
    pub fn contains_message(&self, id: &MessageId) -> bool {
        self.timestamp_of(id).is_some()
    }

    /// Timestamp of a message in this chat, searching the top-level log and
    /// one level of replies.
    pub fn timestamp_of(&self, id: &MessageId) -> Option<i64> {
        for message in &self.messages {
            if &message.id == id {
                return Some(message.timestamp);
            }
            if let Some(reply) = message.replies.iter().find(|r| &r.id == id) {
                return Some(reply.timestamp);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::message::MessageBody;

    fn contact(id: &str) -> Contact {
        Contact::new(
            ContactId::new(id),
            Location::new(format!("mesh://{}.overlay", id)),
        )
    }

    fn plain(chat: &Chat, from: &str, text: &str) -> Message {
        Message::new(
            ContactId::new(from),
            chat.id.clone(),
            MessageBody::Plain(text.into()),
        )
    }

    #[test]
    fn test_direct_chat_id_is_order_independent() {
        let a = ContactId::new("a1");
        let b = ContactId::new("b2");
        assert_eq!(ChatId::direct(&a, &b), ChatId::direct(&b, &a));
        assert_eq!(ChatId::direct(&a, &b).as_str(), "a1-b2");
    }

    #[test]
    fn test_direct_chat_has_two_members() {
        let chat = Chat::direct(contact("self"), contact("a1"));
        assert!(!chat.is_group);
        assert_eq!(chat.contacts.len(), 2);
        assert_eq!(chat.id.as_str(), "a1-self");
    }

    #[test]
    fn test_group_admin_is_member() {
        let chat = Chat::group(
            ChatId::new("g1"),
            "ops",
            contact("m0"),
            vec![contact("m1"), contact("m2"), contact("m0")],
        );
        assert!(chat.is_group);
        assert_eq!(chat.contacts.len(), 3);
        assert_eq!(chat.admin.as_ref().map(|a| a.as_str()), Some("m0"));
        assert!(chat.is_member(&ContactId::new("m0")));
    }

    #[test]
    fn test_record_read_monotonic() {
        let mut chat = Chat::direct(contact("self"), contact("a1"));
        let mut older = plain(&chat, "self", "one");
        older.timestamp = 100;
        let mut newer = plain(&chat, "self", "two");
        newer.timestamp = 200;
        let older_id = older.id;
        let newer_id = newer.id;
        chat.messages.push(older);
        chat.messages.push(newer);

        let reader = ContactId::new("a1");
        assert!(chat.record_read(&reader, &newer_id));
        // Stale receipt arriving late is discarded.
        assert!(!chat.record_read(&reader, &older_id));
        assert_eq!(chat.read.get(&reader), Some(&newer_id));
    }

    #[test]
    fn test_record_read_unknown_target_discarded() {
        let mut chat = Chat::direct(contact("self"), contact("a1"));
        let reader = ContactId::new("a1");
        assert!(!chat.record_read(&reader, &crate::messaging::generate_message_id()));
        assert!(chat.read.is_empty());
    }

    #[test]
    fn test_find_message_in_replies() {
        let mut chat = Chat::direct(contact("self"), contact("a1"));
        let mut parent = plain(&chat, "self", "parent");
        let reply = plain(&chat, "a1", "reply");
        let parent_id = parent.id;
        let reply_id = reply.id;
        parent.replies.push(reply);
        chat.messages.push(parent);

        assert!(chat.find_message(&reply_id).is_none());
        assert!(chat
            .find_message_mut(&reply_id, Some(&parent_id))
            .is_some());
        assert!(chat.contains_message(&reply_id));
    }

    #[test]
    fn test_remove_contact_drops_read_cursor() {
        let mut chat = Chat::direct(contact("self"), contact("a1"));
        let msg = plain(&chat, "self", "hello");
        let msg_id = msg.id;
        chat.messages.push(msg);
        let peer = ContactId::new("a1");
        chat.record_read(&peer, &msg_id);

        assert!(chat.remove_contact(&peer));
        assert!(chat.read.get(&peer).is_none());
        assert!(!chat.remove_contact(&peer));
    }
}
