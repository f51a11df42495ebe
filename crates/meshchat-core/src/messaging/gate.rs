//! Inbound admission gate.
//!
//! Two checks run before any handler dispatch:
//!
//! - the blocked-contact check runs before *any* chat lookup, so a blocked
//!   sender can never cause a state mutation, chat creation included;
//! - system messages are only admitted from the target chat's admin, which
//!   requires the chat to be resolved first.

use crate::error::{Error, Result};
use crate::messaging::chat::Chat;
use crate::messaging::message::{Message, MessageKind};
use crate::storage::BlockedContactStore;
use std::sync::Arc;
use tracing::debug;

/// Pre-dispatch filter for inbound messages.
pub struct AdmissionGate {
    blocked: Arc<dyn BlockedContactStore>,
    page_size: usize,
}

impl AdmissionGate {
    /// Create a gate over the blocked-contact store.
    pub fn new(blocked: Arc<dyn BlockedContactStore>, page_size: usize) -> Self {
        Self { blocked, page_size }
    }

    /// Reject the message if its sender is blocked.
    ///
    /// Pages through the blocked set; must be called before resolving the
    /// target chat.
    pub async fn admit(&self, message: &Message) -> Result<()> {
        let mut offset = 0;
        loop {
            let page = self.blocked.list_blocked(offset, self.page_size).await?;
            if page.iter().any(|id| id == &message.from) {
                debug!(sender = %message.from, kind = %message.kind(), "rejected blocked sender");
                return Err(Error::Blocked(message.from.to_string()));
            }
            if page.len() < self.page_size {
                return Ok(());
            }
            offset += page.len();
        }
    }

    /// Reject a system message whose sender is not the chat's admin.
    ///
    /// Non-system messages pass unchanged.
    pub fn authorize_system(message: &Message, chat: &Chat) -> Result<()> {
        if message.kind() != MessageKind::System {
            return Ok(());
        }
        match &chat.admin {
            Some(admin) if admin == &message.from => Ok(()),
            _ => Err(Error::Unauthorized(format!(
                "system message from non-admin {}",
                message.from
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ContactId, Location};
    use crate::messaging::chat::{ChatId, Contact};
    use crate::messaging::message::{MessageBody, SystemAction};
    use crate::storage::MemoryStore;

    fn contact(id: &str) -> Contact {
        Contact::new(
            ContactId::new(id),
            Location::new(format!("mesh://{}.overlay", id)),
        )
    }

    fn plain_from(id: &str) -> Message {
        Message::new(
            ContactId::new(id),
            ChatId::new("a1-b2"),
            MessageBody::Plain("hi".into()),
        )
    }

    #[tokio::test]
    async fn test_blocked_sender_rejected() {
        let store = Arc::new(MemoryStore::new());
        store.block(&ContactId::new("a1")).await.expect("block");
        let gate = AdmissionGate::new(store, 64);

        let err = gate.admit(&plain_from("a1")).await.expect_err("rejected");
        assert!(matches!(err, Error::Blocked(_)));
        gate.admit(&plain_from("b2")).await.expect("admitted");
    }

    #[tokio::test]
    async fn test_blocked_check_pages_through_full_set() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..10 {
            store
                .block(&ContactId::new(format!("z{:02}", i)))
                .await
                .expect("block");
        }
        // Page size smaller than the set forces pagination.
        let gate = AdmissionGate::new(store, 3);

        let err = gate.admit(&plain_from("z09")).await.expect_err("rejected");
        assert!(matches!(err, Error::Blocked(_)));
    }

    #[test]
    fn test_system_requires_admin() {
        let chat = Chat::group(
            ChatId::new("g1"),
            "ops",
            contact("m0"),
            vec![contact("m1"), contact("m2")],
        );
        let mut msg = plain_from("m1");
        msg.body = MessageBody::System(SystemAction::Renamed("new name".into()));

        let err = AdmissionGate::authorize_system(&msg, &chat).expect_err("rejected");
        assert!(matches!(err, Error::Unauthorized(_)));

        msg.from = ContactId::new("m0");
        AdmissionGate::authorize_system(&msg, &chat).expect("admin admitted");
    }

    #[test]
    fn test_non_system_passes() {
        let chat = Chat::direct(contact("self"), contact("a1"));
        AdmissionGate::authorize_system(&plain_from("a1"), &chat).expect("pass");
    }
}
