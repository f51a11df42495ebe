//! Group fan-out replication.
//!
//! When the local node is the admin of a group, every accepted content
//! message is replicated to the other members by direct delivery. The
//! fan-out is concurrent and wait-for-all: the operation completes only
//! once every branch has been attempted, and one failed branch never
//! cancels its siblings. Per-recipient failures are recorded in the
//! report; the admin's own copy is durable regardless of peer
//! reachability. There is no retry queue.

use crate::crypto::SignatureChain;
use crate::error::{Error, Result};
use crate::identity::{ContactId, NodeIdentity};
use crate::messaging::chat::{Chat, Contact};
use crate::messaging::message::Message;
use crate::storage::ContactStore;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default per-branch send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-recipient result of one replication or delivery pass.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    /// Members that acknowledged delivery.
    pub delivered: Vec<ContactId>,
    /// Members that could not be reached, with the failure reason.
    pub failed: Vec<(ContactId, String)>,
}

impl DeliveryReport {
    /// Whether every attempted branch delivered.
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of attempted branches.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Admin-side replication of accepted group mutations.
pub struct GroupFanout {
    identity: NodeIdentity,
    chain: Arc<SignatureChain>,
    transport: Arc<dyn Transport>,
    contacts: Arc<dyn ContactStore>,
    send_timeout: Duration,
}

impl GroupFanout {
    /// Create a fan-out bound to the local identity.
    pub fn new(
        identity: NodeIdentity,
        chain: Arc<SignatureChain>,
        transport: Arc<dyn Transport>,
        contacts: Arc<dyn ContactStore>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            chain,
            transport,
            contacts,
            send_timeout,
        }
    }

    /// Replicate an accepted message to every other member of `chat`.
    ///
    /// Only valid on the admin node. The sender's signature is verified
    /// against its membership-scoped key (the member record's location,
    /// not global contact trust); the node then adds its own signature
    /// before forwarding. The admin itself and the original sender are
    /// skipped.
    pub async fn replicate(
        &self,
        chat: &Chat,
        message: &Message,
        sender: &ContactId,
    ) -> Result<DeliveryReport> {
        if chat.admin.as_ref() != Some(&self.identity.id) {
            return Err(Error::Unauthorized(
                "only the group admin replicates".into(),
            ));
        }
        let member = chat.contact(sender).ok_or_else(|| {
            Error::VerificationFailed("sender is not a group member".into())
        })?;
        self.chain
            .verify_sender(message, Some(&member.location))
            .await?;

        let signed = self.chain.sign(message.clone()).await?;
        let payload = signed.to_bytes()?;

        let mut targets = Vec::new();
        for contact in &chat.contacts {
            if contact.id == self.identity.id || &contact.id == sender {
                continue;
            }
            targets.push(self.resolve_location(contact).await);
        }
        debug!(
            chat_id = %chat.id,
            message_id = %message.id,
            targets = targets.len(),
            "replicating to group members"
        );
        Ok(deliver_all(self.transport.clone(), self.send_timeout, targets, payload).await)
    }

    /// Current contact record for a member: the contact store is
    /// authoritative for locations, the chat's embedded copy is the
    /// fallback.
    async fn resolve_location(&self, member: &Contact) -> Contact {
        match self.contacts.contact(&member.id).await {
            Ok(Some(current)) => current,
            _ => member.clone(),
        }
    }
}

/// Deliver `payload` to every target concurrently and wait for all
/// branches. Each branch has its own timeout and its failure is isolated
/// to the report entry for that recipient.
pub(crate) async fn deliver_all(
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
    targets: Vec<Contact>,
    payload: Vec<u8>,
) -> DeliveryReport {
    let mut branches = Vec::with_capacity(targets.len());
    for target in targets {
        let transport = transport.clone();
        let payload = payload.clone();
        let id = target.id.clone();
        let handle = tokio::spawn(async move {
            match timeout(send_timeout, transport.send_to_location(&target.location, &payload))
                .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("send timed out".to_string()),
            }
        });
        branches.push((id, handle));
    }

    let mut report = DeliveryReport::default();
    for (id, handle) in branches {
        match handle.await {
            Ok(Ok(())) => report.delivered.push(id),
            Ok(Err(reason)) => {
                warn!(member = %id, reason = %reason, "delivery failed");
                report.failed.push((id, reason));
            }
            Err(join) => {
                warn!(member = %id, error = %join, "delivery task aborted");
                report.failed.push((id, format!("delivery task aborted: {}", join)));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;
    use crate::identity::Location;
    use crate::messaging::chat::ChatId;
    use crate::messaging::message::MessageBody;
    use crate::storage::{KeyStore, MemoryStore};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Transport that fails for configured locations and records sends.
    struct FlakyTransport {
        unreachable: HashSet<String>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send_to_location(&self, location: &Location, _payload: &[u8]) -> Result<()> {
            if self.unreachable.contains(location.as_str()) {
                return Err(Error::Transport("unreachable".into()));
            }
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(location.as_str().to_string());
            Ok(())
        }

        async fn fetch_public_key(&self, _location: &Location) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn contact(id: &str) -> Contact {
        Contact::new(
            ContactId::new(id),
            Location::new(format!("mesh://{}.overlay", id)),
        )
    }

    async fn signed_group_message(
        store: &Arc<MemoryStore>,
        transport: &Arc<FlakyTransport>,
        chat: &Chat,
        from: &str,
    ) -> Message {
        let (public, private) = generate_keypair(&ContactId::new(from));
        store.save_key(&public).await.expect("save public");
        store.save_key(&private).await.expect("save private");
        let chain = SignatureChain::new(
            ContactId::new(from),
            store.clone(),
            transport.clone(),
        );
        let message = Message::new(
            ContactId::new(from),
            chat.id.clone(),
            MessageBody::Plain("to the group".into()),
        );
        chain.sign(message).await.expect("sign")
    }

    fn fanout_for(
        admin: &str,
        store: Arc<MemoryStore>,
        transport: Arc<FlakyTransport>,
    ) -> GroupFanout {
        let identity = NodeIdentity::new(
            ContactId::new(admin),
            Location::new(format!("mesh://{}.overlay", admin)),
        );
        let chain = Arc::new(SignatureChain::new(
            identity.id.clone(),
            store.clone(),
            transport.clone(),
        ));
        GroupFanout::new(identity, chain, transport, store, Duration::from_secs(1))
    }

    fn group() -> Chat {
        Chat::group(
            ChatId::new("g1"),
            "ops",
            contact("m0"),
            vec![contact("m1"), contact("m2")],
        )
    }

    #[tokio::test]
    async fn test_replicates_to_other_members_only() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(FlakyTransport {
            unreachable: HashSet::new(),
            sent: Mutex::new(Vec::new()),
        });
        // Admin m0 needs its own keypair to countersign.
        let (m0_pub, m0_priv) = generate_keypair(&ContactId::new("m0"));
        store.save_key(&m0_pub).await.expect("save");
        store.save_key(&m0_priv).await.expect("save");

        let chat = group();
        let message = signed_group_message(&store, &transport, &chat, "m1").await;
        let fanout = fanout_for("m0", store, transport.clone());

        let report = fanout
            .replicate(&chat, &message, &ContactId::new("m1"))
            .await
            .expect("replicate");

        // Self and sender are skipped; only m2 is attempted.
        assert_eq!(report.attempted(), 1);
        assert_eq!(report.delivered, vec![ContactId::new("m2")]);
        let sent = transport.sent.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(sent.as_slice(), ["mesh://m2.overlay"]);
    }

    #[tokio::test]
    async fn test_failed_branch_is_isolated() {
        let store = Arc::new(MemoryStore::new());
        let mut unreachable = HashSet::new();
        unreachable.insert("mesh://m2.overlay".to_string());
        let transport = Arc::new(FlakyTransport {
            unreachable,
            sent: Mutex::new(Vec::new()),
        });
        let (m0_pub, m0_priv) = generate_keypair(&ContactId::new("m0"));
        store.save_key(&m0_pub).await.expect("save");
        store.save_key(&m0_priv).await.expect("save");

        let chat = Chat::group(
            ChatId::new("g1"),
            "ops",
            contact("m0"),
            vec![contact("m1"), contact("m2"), contact("m3")],
        );
        let message = signed_group_message(&store, &transport, &chat, "m1").await;
        let fanout = fanout_for("m0", store, transport);

        let report = fanout
            .replicate(&chat, &message, &ContactId::new("m1"))
            .await
            .expect("replicate succeeds despite branch failure");

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.delivered, vec![ContactId::new("m3")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ContactId::new("m2"));
        assert!(!report.all_delivered());
    }

    #[tokio::test]
    async fn test_non_admin_cannot_replicate() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(FlakyTransport {
            unreachable: HashSet::new(),
            sent: Mutex::new(Vec::new()),
        });
        let chat = group();
        let message = signed_group_message(&store, &transport, &chat, "m1").await;
        let fanout = fanout_for("m2", store, transport);

        let err = fanout
            .replicate(&chat, &message, &ContactId::new("m1"))
            .await
            .expect_err("must reject");
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_non_member_sender_rejected() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(FlakyTransport {
            unreachable: HashSet::new(),
            sent: Mutex::new(Vec::new()),
        });
        let chat = group();
        let message = signed_group_message(&store, &transport, &chat, "outsider").await;
        let fanout = fanout_for("m0", store, transport);

        let err = fanout
            .replicate(&chat, &message, &ContactId::new("outsider"))
            .await
            .expect_err("must reject");
        assert!(matches!(err, Error::VerificationFailed(_)));
    }
}
