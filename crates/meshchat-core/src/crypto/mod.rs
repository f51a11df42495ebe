//! Cryptographic trust layer.
//!
//! Message authenticity rests on Ed25519 signature chains over canonical
//! message bytes. Transport-level encryption is intentionally absent from
//! this engine; only content signing is handled here.
//!
//! - **Ed25519**: message signatures
//! - **SHA-256**: key fingerprints (see [`crate::identity`])
//! - Key material travels as base64 strings, private material is zeroized
//!   when decoded

mod chain;
mod keys;

pub use chain::{canonical_bytes, SignatureChain};
pub use keys::{
    decode_signing_key, decode_verifying_key, encode_verifying_key, generate_keypair, KeyKind,
    KeyRecord, ED25519_KEY_SIZE,
};
