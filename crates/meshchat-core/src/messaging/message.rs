//! Message model: identifiers, per-type payloads, and the signature list.
//!
//! The message type and its payload collapse into one closed tagged enum,
//! [`MessageBody`]; dispatch in the handler layer is a match over the
//! variants, with no shared state between handlers.
//!
//! A message is immutable once signed, except through the edit/delete/read
//! mutation paths applied by the handlers.

use crate::error::{Error, Result};
use crate::identity::ContactId;
use crate::messaging::chat::{ChatId, Contact};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub [u8; 16]);

impl MessageId {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get as bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Generate a random message id.
pub fn generate_message_id() -> MessageId {
    let mut id = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut id);
    MessageId(id)
}

/// An attached file. Content is opaque to the engine and lives in the
/// file store under `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// Original file name.
    pub name: String,
    /// File-store path of the blob.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

/// Admin-originated chat mutations carried by system messages.
///
/// System messages mutate chat membership/metadata and are never appended
/// to the visible message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemAction {
    /// A member joined the chat.
    MemberAdded(Contact),
    /// A member was removed from the chat.
    MemberRemoved(ContactId),
    /// The chat was renamed.
    Renamed(String),
}

/// Message payload, one variant per message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Plain text content.
    Plain(String),
    /// Animated image reference.
    Gif(String),
    /// File attachment.
    File(FileAttachment),
    /// Shared file reference (content stays at the sender).
    FileShare(FileAttachment),
    /// Request to become a contact; carries the sender's contact card.
    ContactRequest(Contact),
    /// Admin-only chat mutation.
    System(SystemAction),
    /// Read receipt: the id of the last message the sender has read.
    Read(MessageId),
    /// Full replacement for an existing message; the replacement's id names
    /// the edit target.
    Edit(Box<Message>),
    /// Request to supersede a message with a tombstone.
    Delete {
        /// Id of the message to tombstone.
        target: MessageId,
        /// Tombstone text written in place of the original content.
        placeholder: String,
    },
    /// Tombstone state of a deleted message. Written locally by delete
    /// handling; keeps the log position and reply references intact.
    Deleted(String),
}

/// Discriminant of [`MessageBody`], used for dispatch and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Plain text.
    Plain,
    /// Animated image.
    Gif,
    /// File attachment.
    File,
    /// Shared file reference.
    FileShare,
    /// Contact request.
    ContactRequest,
    /// Admin chat mutation.
    System,
    /// Read receipt.
    Read,
    /// Edit of an existing message.
    Edit,
    /// Delete request.
    Delete,
    /// Tombstone.
    Deleted,
}

impl MessageKind {
    /// Whether messages of this kind are appended verbatim to the visible
    /// message log.
    pub fn is_content(self) -> bool {
        matches!(
            self,
            MessageKind::Plain | MessageKind::Gif | MessageKind::File | MessageKind::FileShare
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Plain => "plain",
            MessageKind::Gif => "gif",
            MessageKind::File => "file",
            MessageKind::FileShare => "file_share",
            MessageKind::ContactRequest => "contact_request",
            MessageKind::System => "system",
            MessageKind::Read => "read",
            MessageKind::Edit => "edit",
            MessageKind::Delete => "delete",
            MessageKind::Deleted => "deleted",
        };
        write!(f, "{}", name)
    }
}

impl MessageBody {
    /// The kind discriminant of this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Plain(_) => MessageKind::Plain,
            MessageBody::Gif(_) => MessageKind::Gif,
            MessageBody::File(_) => MessageKind::File,
            MessageBody::FileShare(_) => MessageKind::FileShare,
            MessageBody::ContactRequest(_) => MessageKind::ContactRequest,
            MessageBody::System(_) => MessageKind::System,
            MessageBody::Read(_) => MessageKind::Read,
            MessageBody::Edit(_) => MessageKind::Edit,
            MessageBody::Delete { .. } => MessageKind::Delete,
            MessageBody::Deleted(_) => MessageKind::Deleted,
        }
    }
}

/// A complete message with its signature chain.
///
/// `signatures` is ordered newest first. Each entry signs the canonical
/// bytes of the message with only the signatures older than itself
/// present, so every forwarding node can add its own signature without
/// invalidating earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Sender's contact id.
    pub from: ContactId,
    /// Target chat.
    pub to: ChatId,
    /// Per-type payload.
    pub body: MessageBody,
    /// Unix timestamp (seconds) at creation.
    pub timestamp: i64,
    /// Optional reference to another message (reply parent or edit scope).
    pub subject: Option<MessageId>,
    /// Signature chain, base64, newest first.
    pub signatures: Vec<String>,
    /// Replies attached beneath this message (one level).
    pub replies: Vec<Message>,
    /// Unix timestamp of the last superseding edit, if any.
    pub updated: Option<i64>,
}

impl Message {
    /// Create a new unsigned message stamped with the current time.
    pub fn new(from: ContactId, to: ChatId, body: MessageBody) -> Self {
        Self {
            id: generate_message_id(),
            from,
            to,
            body,
            timestamp: chrono::Utc::now().timestamp(),
            subject: None,
            signatures: Vec::new(),
            replies: Vec::new(),
            updated: None,
        }
    }

    /// Set the subject reference (reply parent or edit scope).
    pub fn with_subject(mut self, subject: MessageId) -> Self {
        self.subject = Some(subject);
        self
    }

    /// The kind discriminant of this message's payload.
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Encoding(e.to_string()))
    }

    /// Deserialize from wire bytes. Oversized payloads are rejected
    /// before parsing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > crate::MAX_MESSAGE_SIZE {
            return Err(Error::Encoding(format!(
                "message exceeds {} bytes",
                crate::MAX_MESSAGE_SIZE
            )));
        }
        bincode::deserialize(bytes).map_err(|e| Error::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Location;

    fn plain(text: &str) -> Message {
        Message::new(
            ContactId::new("a1"),
            ChatId::new("a1-b2"),
            MessageBody::Plain(text.into()),
        )
    }

    #[test]
    fn test_message_creation() {
        let msg = plain("hi");
        assert_eq!(msg.kind(), MessageKind::Plain);
        assert!(msg.signatures.is_empty());
        assert!(msg.replies.is_empty());
        assert!(msg.updated.is_none());
    }

    #[test]
    fn test_message_id_display() {
        let id = MessageId([0xab; 16]);
        assert_eq!(format!("{}", id), "ab".repeat(16));
    }

    #[test]
    fn test_kind_classification() {
        assert!(MessageKind::Plain.is_content());
        assert!(MessageKind::FileShare.is_content());
        assert!(!MessageKind::Read.is_content());
        assert!(!MessageKind::System.is_content());
        assert!(!MessageKind::Delete.is_content());
    }

    #[test]
    fn test_wire_roundtrip() {
        let contact = Contact::new(ContactId::new("c3"), Location::new("mesh://c3.overlay"));
        let mut msg = plain("hello");
        msg.body = MessageBody::ContactRequest(contact);
        msg.signatures.push("c2lnbmF0dXJl".into());

        let bytes = msg.to_bytes().expect("should serialize");
        let parsed = Message::from_bytes(&bytes).expect("should parse");
        assert_eq!(parsed, msg);
    }
}
