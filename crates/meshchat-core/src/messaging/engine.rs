//! The message engine: inbound admission pipeline and outbound send path.
//!
//! Inbound control flow:
//!
//! ```text
//! message -> AdmissionGate -> resolve chat -> system authorization
//!         -> signature verification (outside the chat lock)
//!         -> per-chat lock: dispatch handler + persist
//!         -> events -> group fan-out (admin only)
//! ```
//!
//! Contact requests short-circuit before chat resolution: they create a
//! pending contact record and never a chat. Chat creation is explicit,
//! through [`MessageEngine::accept_contact_request`] or group creation.
//!
//! Outbound messages are signed first (a missing private key aborts the
//! send), then mirror the inbound pipeline for local persistence before
//! delivery to the peers.

use crate::crypto::SignatureChain;
use crate::error::{Error, Result};
use crate::identity::{ContactId, NodeIdentity};
use crate::messaging::aggregate::{ChatAggregate, PageRequest};
use crate::messaging::chat::{Chat, ChatId, Contact};
use crate::messaging::fanout::{deliver_all, DeliveryReport, GroupFanout};
use crate::messaging::gate::AdmissionGate;
use crate::messaging::handlers::HandlerOutcome;
use crate::messaging::message::{
    generate_message_id, FileAttachment, Message, MessageBody, MessageId, MessageKind,
};
use crate::storage::{BlockedContactStore, ChatStore, ContactStore, FileStore, KeyStore};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notifications emitted after a successful local commit, never before.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A chat's state changed.
    ChatMutated {
        /// The mutated chat.
        chat_id: ChatId,
    },
    /// A message was committed locally.
    MessageDelivered {
        /// The committed message.
        message_id: MessageId,
    },
    /// A contact was added to the blocked set.
    ContactBlocked {
        /// The blocked contact.
        contact_id: ContactId,
    },
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-branch send timeout for delivery and fan-out.
    pub send_timeout: Duration,
    /// Page size used when scanning the blocked-contact set.
    pub blocked_page_size: usize,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            send_timeout: crate::messaging::fanout::DEFAULT_SEND_TIMEOUT,
            blocked_page_size: 64,
            event_capacity: 128,
        }
    }
}

/// What the engine did with an inbound message.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// A contact request was recorded as pending; no chat exists yet.
    PendingContact(ContactId),
    /// The message was applied to a chat.
    Applied {
        /// The target chat.
        chat_id: ChatId,
        /// What the handler did.
        outcome: HandlerOutcome,
        /// Fan-out report when the local node replicated as group admin.
        fanout: Option<DeliveryReport>,
    },
}

/// Receipt for an outbound message: the signed message as persisted and
/// the per-recipient delivery report.
#[derive(Debug)]
pub struct SendReceipt {
    /// The signed message.
    pub message: Message,
    /// Delivery results per recipient.
    pub delivery: DeliveryReport,
}

/// The message synchronization and trust engine for one node.
pub struct MessageEngine {
    identity: NodeIdentity,
    chats: ChatAggregate,
    chain: Arc<SignatureChain>,
    gate: AdmissionGate,
    fanout: GroupFanout,
    contacts: Arc<dyn ContactStore>,
    blocked: Arc<dyn BlockedContactStore>,
    files: Arc<dyn FileStore>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    events: broadcast::Sender<EngineEvent>,
}

impl MessageEngine {
    /// Assemble an engine from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: NodeIdentity,
        chat_store: Arc<dyn ChatStore>,
        contacts: Arc<dyn ContactStore>,
        keys: Arc<dyn KeyStore>,
        blocked: Arc<dyn BlockedContactStore>,
        files: Arc<dyn FileStore>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        let chain = Arc::new(SignatureChain::new(
            identity.id.clone(),
            keys,
            transport.clone(),
        ));
        let gate = AdmissionGate::new(blocked.clone(), config.blocked_page_size);
        let fanout = GroupFanout::new(
            identity.clone(),
            chain.clone(),
            transport.clone(),
            contacts.clone(),
            config.send_timeout,
        );
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            identity,
            chats: ChatAggregate::new(chat_store),
            chain,
            gate,
            fanout,
            contacts,
            blocked,
            files,
            transport,
            config,
            events,
        }
    }

    /// The local node's identity context.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Run an inbound message through the admission pipeline.
    pub async fn receive(&self, message: Message) -> Result<ReceiveOutcome> {
        // The blocked check runs before any chat lookup so a blocked
        // sender cannot cause chat creation.
        self.gate.admit(&message).await?;

        if message.kind() == MessageKind::ContactRequest {
            return self.receive_contact_request(message).await;
        }

        let chat = self.chats.resolve(&message.to).await?;
        AdmissionGate::authorize_system(&message, &chat)?;

        // Verify before taking the chat lock; key fetch may block on the
        // network. The signer's location is membership-scoped.
        let location = chat.contact(&message.from).map(|c| c.location.clone());
        self.chain
            .verify_sender(&message, location.as_ref())
            .await?;

        let message_id = message.id;
        let kind = message.kind();
        let sender = message.from.clone();
        let chat_id = message.to.clone();
        let replicates = chat.is_group
            && chat.admin.as_ref() == Some(&self.identity.id)
            && kind.is_content();
        let fanout_copy = replicates.then(|| message.clone());

        let now = chrono::Utc::now().timestamp();
        let (chat, outcome) = self.chats.apply(message, now).await?;

        if outcome.mutated() {
            let _ = self.events.send(EngineEvent::ChatMutated {
                chat_id: chat_id.clone(),
            });
        }
        if matches!(outcome, HandlerOutcome::Appended(_)) {
            let _ = self.events.send(EngineEvent::MessageDelivered { message_id });
        }

        let fanout = match fanout_copy {
            Some(copy) if outcome.mutated() => {
                // The message is already committed locally; a replication
                // failure is reported, never escalated into a rejection.
                match self.fanout.replicate(&chat, &copy, &sender).await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!(chat_id = %chat_id, error = %e, "group replication failed");
                        None
                    }
                }
            }
            _ => None,
        };

        debug!(
            chat_id = %chat_id,
            message_id = %message_id,
            kind = %kind,
            ?outcome,
            "inbound message applied"
        );
        Ok(ReceiveOutcome::Applied {
            chat_id,
            outcome,
            fanout,
        })
    }

    async fn receive_contact_request(&self, message: Message) -> Result<ReceiveOutcome> {
        let MessageBody::ContactRequest(card) = &message.body else {
            return Err(Error::Encoding("malformed contact request".into()));
        };
        if card.id != message.from {
            return Err(Error::VerificationFailed(
                "contact card does not match sender".into(),
            ));
        }
        // No chat exists yet; the card's own location is the only place
        // the signer's key can come from.
        self.chain
            .verify_sender(&message, Some(&card.location))
            .await?;
        self.contacts.save_pending_request(card).await?;
        info!(contact = %card.id, "contact request pending");
        Ok(ReceiveOutcome::PendingContact(card.id.clone()))
    }

    /// Accept a pending contact request, creating the 1:1 chat.
    pub async fn accept_contact_request(&self, id: &ContactId) -> Result<Chat> {
        let pending = self
            .contacts
            .pending_request(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("pending contact request from {}", id)))?;
        self.contacts.save_contact(&pending).await?;
        self.contacts.clear_pending_request(id).await?;

        let local = Contact::new(self.identity.id.clone(), self.identity.location.clone());
        let chat = self.chats.create_direct(local, pending).await?;
        let _ = self.events.send(EngineEvent::ChatMutated {
            chat_id: chat.id.clone(),
        });
        info!(contact = %id, chat_id = %chat.id, "contact request accepted");
        Ok(chat)
    }

    /// Reject a pending contact request.
    pub async fn reject_contact_request(&self, id: &ContactId) -> Result<()> {
        self.contacts.clear_pending_request(id).await
    }

    /// Sign and send a message to a chat.
    ///
    /// The message is persisted locally through the same handler path as
    /// inbound traffic, then delivered: to the peer for a 1:1 chat, to
    /// every other member when the local node is the group admin, or to
    /// the admin otherwise. Per-recipient failures are reported, not
    /// escalated; the local copy is durable either way.
    pub async fn send(&self, chat_id: &ChatId, body: MessageBody) -> Result<SendReceipt> {
        let chat = self.chats.resolve(chat_id).await?;
        if !chat.is_member(&self.identity.id) {
            return Err(Error::Unauthorized(format!(
                "local node is not a member of {}",
                chat_id
            )));
        }

        let message = Message::new(self.identity.id.clone(), chat_id.clone(), body);
        // Missing private key is fatal here; an unsigned message must not
        // reach the transport looking signed.
        let message = self.chain.sign(message).await?;

        let now = chrono::Utc::now().timestamp();
        let (chat, outcome) = self.chats.apply(message.clone(), now).await?;
        if outcome.mutated() {
            let _ = self.events.send(EngineEvent::ChatMutated {
                chat_id: chat_id.clone(),
            });
            let _ = self.events.send(EngineEvent::MessageDelivered {
                message_id: message.id,
            });
        }

        let delivery = self.deliver(&chat, &message).await?;
        Ok(SendReceipt { message, delivery })
    }

    /// Send a read receipt for `target` in `chat_id`.
    pub async fn send_read_receipt(
        &self,
        chat_id: &ChatId,
        target: MessageId,
    ) -> Result<SendReceipt> {
        self.send(chat_id, MessageBody::Read(target)).await
    }

    /// Store a file blob and send it as an attachment.
    pub async fn send_file(
        &self,
        chat_id: &ChatId,
        name: &str,
        bytes: &[u8],
    ) -> Result<SendReceipt> {
        let path = format!("{}/{}-{}", chat_id, generate_message_id(), name);
        self.files.write(&path, bytes).await?;
        let attachment = FileAttachment {
            name: name.to_string(),
            path,
            size: bytes.len() as u64,
        };
        self.send(chat_id, MessageBody::File(attachment)).await
    }

    /// Read a stored attachment blob.
    pub async fn read_attachment(&self, attachment: &FileAttachment) -> Result<Vec<u8>> {
        self.files.read(&attachment.path).await
    }

    /// Create a group chat with the local node as admin.
    pub async fn create_group(
        &self,
        name: impl Into<String>,
        members: Vec<Contact>,
    ) -> Result<Chat> {
        let admin = Contact::new(self.identity.id.clone(), self.identity.location.clone());
        let chat = self.chats.create_group(name, admin, members).await?;
        let _ = self.events.send(EngineEvent::ChatMutated {
            chat_id: chat.id.clone(),
        });
        Ok(chat)
    }

    /// Delete a chat locally. Never propagates to other members.
    pub async fn delete_chat(&self, chat_id: &ChatId) -> Result<()> {
        self.chats.delete_chat(chat_id).await
    }

    /// Page through a chat's messages.
    pub async fn chat_messages(
        &self,
        chat_id: &ChatId,
        request: &PageRequest,
    ) -> Result<Vec<Message>> {
        let chat = self.chats.resolve(chat_id).await?;
        Ok(ChatAggregate::messages_page(&chat, request))
    }

    /// Store a locally composed draft on its chat.
    pub async fn save_draft(&self, chat_id: &ChatId, body: MessageBody) -> Result<Message> {
        let draft = Message::new(self.identity.id.clone(), chat_id.clone(), body);
        self.chats.save_draft(chat_id, draft.clone()).await?;
        Ok(draft)
    }

    /// Discard a draft.
    pub async fn discard_draft(&self, chat_id: &ChatId, draft_id: &MessageId) -> Result<()> {
        self.chats.discard_draft(chat_id, draft_id).await?;
        Ok(())
    }

    /// Add a contact to the blocked set.
    pub async fn block_contact(&self, id: &ContactId) -> Result<()> {
        self.blocked.block(id).await?;
        let _ = self.events.send(EngineEvent::ContactBlocked {
            contact_id: id.clone(),
        });
        info!(contact = %id, "contact blocked");
        Ok(())
    }

    /// Remove a contact from the blocked set.
    pub async fn unblock_contact(&self, id: &ContactId) -> Result<()> {
        self.blocked.unblock(id).await
    }

    /// Deliver a locally committed message to its recipients.
    async fn deliver(&self, chat: &Chat, message: &Message) -> Result<DeliveryReport> {
        let payload = message.to_bytes()?;
        let mut targets = Vec::new();
        let local_is_admin = chat.admin.as_ref() == Some(&self.identity.id);
        for contact in &chat.contacts {
            if contact.id == self.identity.id {
                continue;
            }
            // Non-admin group members deliver to the admin only; the
            // admin fans out to everyone else.
            if chat.is_group && !local_is_admin && chat.admin.as_ref() != Some(&contact.id) {
                continue;
            }
            targets.push(self.resolve_contact(contact).await);
        }
        if targets.is_empty() {
            warn!(chat_id = %chat.id, "no delivery targets");
        }
        Ok(deliver_all(
            self.transport.clone(),
            self.config.send_timeout,
            targets,
            payload,
        )
        .await)
    }

    /// Prefer the contact store's current record over the chat's copy.
    async fn resolve_contact(&self, member: &Contact) -> Contact {
        match self.contacts.contact(&member.id).await {
            Ok(Some(current)) => current,
            _ => member.clone(),
        }
    }
}
