//! Per-type message handlers.
//!
//! Dispatch is a closed match over [`MessageBody`] variants; every handler
//! is a pure function `(message, &mut Chat, now) -> HandlerOutcome` with
//! persistence applied by the caller. Handlers share no state beyond the
//! chat itself and are invoked once per message.
//!
//! Edit and delete are superseding mutations: the target entry keeps its
//! log position and reply references. A missing edit/delete target is a
//! logged no-op so that retransmitted stale mutations stay harmless.

use crate::error::Result;
use crate::identity::ContactId;
use crate::messaging::chat::Chat;
use crate::messaging::message::{Message, MessageBody, MessageId, SystemAction};
use tracing::{debug, warn};

/// What a handler did to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// A content message was appended to the log (or a reply list).
    Appended(MessageId),
    /// A read cursor moved forward.
    ReadRecorded {
        /// Whose cursor moved.
        reader: ContactId,
    },
    /// An existing message's body was replaced.
    Edited(MessageId),
    /// An existing message was tombstoned.
    Deleted(MessageId),
    /// Membership or chat metadata changed.
    MembershipChanged,
    /// Nothing changed (duplicate, stale receipt, or missing target).
    Ignored,
}

impl HandlerOutcome {
    /// Whether the chat was mutated and needs persisting.
    pub fn mutated(&self) -> bool {
        !matches!(self, HandlerOutcome::Ignored)
    }
}

/// Apply a message to its chat, dispatching on the payload variant.
///
/// `now` stamps superseding edits; it is passed in so handlers stay pure.
pub fn dispatch(message: Message, chat: &mut Chat, now: i64) -> Result<HandlerOutcome> {
    match &message.body {
        MessageBody::Plain(_)
        | MessageBody::Gif(_)
        | MessageBody::File(_)
        | MessageBody::FileShare(_) => Ok(append_content(message, chat)),
        MessageBody::Read(_) => Ok(handle_read(&message, chat)),
        MessageBody::Edit(_) => Ok(handle_edit(message, chat, now)),
        MessageBody::Delete { .. } => Ok(handle_delete(&message, chat)),
        MessageBody::System(_) => Ok(handle_system(message, chat)),
        MessageBody::ContactRequest(_) | MessageBody::Deleted(_) => {
            // Contact requests are resolved before chat dispatch; inbound
            // tombstones carry no mutation of their own.
            warn!(kind = %message.kind(), "message kind not valid for chat dispatch, ignoring");
            Ok(HandlerOutcome::Ignored)
        }
    }
}

/// Append a content message verbatim.
///
/// A `subject` naming an existing top-level message attaches the new
/// message to that parent's reply list instead. Redelivered ids are
/// skipped.
pub(crate) fn append_content(message: Message, chat: &mut Chat) -> HandlerOutcome {
    if chat.contains_message(&message.id) {
        debug!(message_id = %message.id, "duplicate message id, ignoring");
        return HandlerOutcome::Ignored;
    }
    let id = message.id;
    if let Some(parent_id) = message.subject {
        if let Some(parent) = chat.messages.iter_mut().find(|m| m.id == parent_id) {
            parent.replies.push(message);
            return HandlerOutcome::Appended(id);
        }
    }
    chat.messages.push(message);
    HandlerOutcome::Appended(id)
}

fn handle_read(message: &Message, chat: &mut Chat) -> HandlerOutcome {
    let MessageBody::Read(target) = &message.body else {
        return HandlerOutcome::Ignored;
    };
    if chat.record_read(&message.from, target) {
        HandlerOutcome::ReadRecorded {
            reader: message.from.clone(),
        }
    } else {
        debug!(
            reader = %message.from,
            target = %target,
            "stale or unknown read receipt discarded"
        );
        HandlerOutcome::Ignored
    }
}

fn handle_edit(message: Message, chat: &mut Chat, now: i64) -> HandlerOutcome {
    let MessageBody::Edit(replacement) = message.body else {
        return HandlerOutcome::Ignored;
    };
    let target_id = replacement.id;
    match chat.find_message_mut(&target_id, message.subject.as_ref()) {
        Some(target) => {
            if target.body == replacement.body {
                // Redelivered edit; already applied.
                return HandlerOutcome::Edited(target_id);
            }
            target.body = replacement.body;
            target.updated = Some(now);
            HandlerOutcome::Edited(target_id)
        }
        None => {
            warn!(target = %target_id, "edit target not found, ignoring");
            HandlerOutcome::Ignored
        }
    }
}

fn handle_delete(message: &Message, chat: &mut Chat) -> HandlerOutcome {
    let MessageBody::Delete {
        target,
        placeholder,
    } = &message.body
    else {
        return HandlerOutcome::Ignored;
    };
    match chat.find_message_mut(target, message.subject.as_ref()) {
        Some(entry) => {
            entry.body = MessageBody::Deleted(placeholder.clone());
            HandlerOutcome::Deleted(*target)
        }
        None => {
            warn!(target = %target, "delete target not found, ignoring");
            HandlerOutcome::Ignored
        }
    }
}

fn handle_system(message: Message, chat: &mut Chat) -> HandlerOutcome {
    let MessageBody::System(action) = message.body else {
        return HandlerOutcome::Ignored;
    };
    match action {
        SystemAction::MemberAdded(contact) => {
            chat.upsert_contact(contact);
        }
        SystemAction::MemberRemoved(id) => {
            if !chat.remove_contact(&id) {
                debug!(member = %id, "removed member was not present");
            }
        }
        SystemAction::Renamed(name) => {
            chat.name = name;
        }
    }
    HandlerOutcome::MembershipChanged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Location;
    use crate::messaging::chat::{ChatId, Contact};

    fn contact(id: &str) -> Contact {
        Contact::new(
            ContactId::new(id),
            Location::new(format!("mesh://{}.overlay", id)),
        )
    }

    fn chat() -> Chat {
        Chat::direct(contact("self"), contact("a1"))
    }

    fn plain(chat: &Chat, from: &str, text: &str) -> Message {
        Message::new(
            ContactId::new(from),
            chat.id.clone(),
            MessageBody::Plain(text.into()),
        )
    }

    #[test]
    fn test_content_appended_verbatim() {
        let mut chat = chat();
        let msg = plain(&chat, "a1", "hi");
        let id = msg.id;

        let outcome = dispatch(msg, &mut chat, 0).expect("dispatch");
        assert_eq!(outcome, HandlerOutcome::Appended(id));
        assert_eq!(chat.messages.len(), 1);
    }

    #[test]
    fn test_duplicate_append_ignored() {
        let mut chat = chat();
        let msg = plain(&chat, "a1", "hi");

        dispatch(msg.clone(), &mut chat, 0).expect("first");
        let outcome = dispatch(msg, &mut chat, 0).expect("second");
        assert_eq!(outcome, HandlerOutcome::Ignored);
        assert_eq!(chat.messages.len(), 1);
    }

    #[test]
    fn test_reply_attached_to_parent() {
        let mut chat = chat();
        let parent = plain(&chat, "self", "parent");
        let parent_id = parent.id;
        dispatch(parent, &mut chat, 0).expect("parent");

        let reply = plain(&chat, "a1", "reply").with_subject(parent_id);
        let reply_id = reply.id;
        dispatch(reply, &mut chat, 0).expect("reply");

        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].replies.len(), 1);
        assert_eq!(chat.messages[0].replies[0].id, reply_id);
    }

    #[test]
    fn test_read_receipt_moves_cursor_forward_only() {
        let mut chat = chat();
        let mut first = plain(&chat, "self", "one");
        first.timestamp = 100;
        let mut second = plain(&chat, "self", "two");
        second.timestamp = 200;
        let first_id = first.id;
        let second_id = second.id;
        chat.messages.push(first);
        chat.messages.push(second);

        let reader = ContactId::new("a1");
        let r2 = Message::new(reader.clone(), chat.id.clone(), MessageBody::Read(second_id));
        let r1 = Message::new(reader.clone(), chat.id.clone(), MessageBody::Read(first_id));

        // Receipts arrive newest first; the stale one is discarded.
        assert!(dispatch(r2, &mut chat, 0).expect("r2").mutated());
        assert_eq!(
            dispatch(r1, &mut chat, 0).expect("r1"),
            HandlerOutcome::Ignored
        );
        assert_eq!(chat.read.get(&reader), Some(&second_id));
    }

    #[test]
    fn test_edit_replaces_body_and_is_idempotent() {
        let mut chat = chat();
        let original = plain(&chat, "a1", "typo");
        let target_id = original.id;
        dispatch(original, &mut chat, 0).expect("append");

        let mut replacement = plain(&chat, "a1", "fixed");
        replacement.id = target_id;
        let edit = Message::new(
            ContactId::new("a1"),
            chat.id.clone(),
            MessageBody::Edit(Box::new(replacement)),
        );

        dispatch(edit.clone(), &mut chat, 500).expect("edit");
        let after_once = chat.clone();

        // Applying the same edit again changes nothing.
        dispatch(edit, &mut chat, 900).expect("edit again");
        assert_eq!(chat.messages, after_once.messages);
        assert_eq!(
            chat.messages[0].body,
            MessageBody::Plain("fixed".into())
        );
        assert_eq!(chat.messages[0].updated, Some(500));
    }

    #[test]
    fn test_edit_missing_target_is_noop() {
        let mut chat = chat();
        let replacement = plain(&chat, "a1", "fixed");
        let edit = Message::new(
            ContactId::new("a1"),
            chat.id.clone(),
            MessageBody::Edit(Box::new(replacement)),
        );

        let outcome = dispatch(edit, &mut chat, 0).expect("edit");
        assert_eq!(outcome, HandlerOutcome::Ignored);
        assert!(chat.messages.is_empty());
    }

    #[test]
    fn test_delete_tombstones_in_place() {
        let mut chat = chat();
        let first = plain(&chat, "a1", "one");
        let second = plain(&chat, "a1", "two");
        let first_id = first.id;
        dispatch(first, &mut chat, 0).expect("one");
        dispatch(second, &mut chat, 0).expect("two");

        let delete = Message::new(
            ContactId::new("a1"),
            chat.id.clone(),
            MessageBody::Delete {
                target: first_id,
                placeholder: "message removed".into(),
            },
        );
        dispatch(delete.clone(), &mut chat, 0).expect("delete");

        // The entry keeps its position; only the body is superseded.
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].id, first_id);
        assert_eq!(
            chat.messages[0].body,
            MessageBody::Deleted("message removed".into())
        );

        // Redelivery is idempotent.
        let after_once = chat.clone();
        dispatch(delete, &mut chat, 0).expect("delete again");
        assert_eq!(chat.messages, after_once.messages);
    }

    #[test]
    fn test_system_membership_mutation_not_logged() {
        let mut chat = Chat::group(
            ChatId::new("g1"),
            "ops",
            contact("m0"),
            vec![contact("m1")],
        );
        let add = Message::new(
            ContactId::new("m0"),
            chat.id.clone(),
            MessageBody::System(SystemAction::MemberAdded(contact("m2"))),
        );
        let outcome = dispatch(add, &mut chat, 0).expect("add");
        assert_eq!(outcome, HandlerOutcome::MembershipChanged);
        assert!(chat.is_member(&ContactId::new("m2")));
        assert!(chat.messages.is_empty());

        let remove = Message::new(
            ContactId::new("m0"),
            chat.id.clone(),
            MessageBody::System(SystemAction::MemberRemoved(ContactId::new("m1"))),
        );
        dispatch(remove, &mut chat, 0).expect("remove");
        assert!(!chat.is_member(&ContactId::new("m1")));
        assert!(chat.messages.is_empty());
    }
}
