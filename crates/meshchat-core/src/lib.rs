//! # Meshchat Core Library
//!
//! The message synchronization and trust engine for a peer-to-peer chat
//! node. Each user runs a node addressable on an overlay network; chats
//! are 1:1 or admin-managed groups whose history is replicated by direct
//! node-to-node delivery; there is no central server and no shared
//! transaction log.
//!
//! ## Core Guarantees
//!
//! - Every message carries an Ed25519 signature chain; verification fails
//!   closed and tampering with signed content is detectable at any hop
//! - A blocked sender can never mutate local state, chat creation included
//! - Read cursors only move forward in time per sender
//! - Edit and delete supersede in place; redelivery is idempotent
//! - One mutation runs per chat at a time, even under concurrent delivery
//! - The admin of a group replicates accepted messages to all members,
//!   wait-for-all, with per-recipient failure isolation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Application                │
//! ├─────────────────────────────────────────┤
//! │   messaging (engine, handlers, chats)   │
//! ├─────────────────────────────────────────┤
//! │   crypto (signature chain)  │ identity  │
//! ├─────────────────────────────────────────┤
//! │   storage (keyed stores)    │ transport │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Transport plumbing, overlay address resolution, and persistence engine
//! internals stay outside the crate, consumed through the narrow traits in
//! [`storage`] and [`transport`].

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod crypto;
pub mod error;
pub mod identity;
pub mod logging;
pub mod messaging;
pub mod storage;
pub mod transport;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum wire size of a single message (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 65536;
