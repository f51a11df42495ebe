//! Message synchronization for meshchat.
//!
//! Holds the message and chat models, the per-type handler state machine,
//! the chat aggregate service, the admission gate, group fan-out, and the
//! engine that wires them into the inbound/outbound pipelines.

mod aggregate;
mod chat;
mod engine;
mod fanout;
mod gate;
mod handlers;
mod message;

pub use aggregate::{ChatAggregate, PageRequest, DEFAULT_PAGE_SIZE};
pub use chat::{Chat, ChatId, Contact};
pub use engine::{EngineConfig, EngineEvent, MessageEngine, ReceiveOutcome, SendReceipt};
pub use fanout::{DeliveryReport, GroupFanout, DEFAULT_SEND_TIMEOUT};
pub use gate::AdmissionGate;
pub use handlers::{dispatch, HandlerOutcome};
pub use message::{
    generate_message_id, FileAttachment, Message, MessageBody, MessageId, MessageKind,
    SystemAction,
};
