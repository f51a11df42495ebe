//! Signing key records and Ed25519 material handling.
//!
//! Key material is carried as base64 strings so records round-trip through
//! any keyed store. Exactly one private key exists for the local identity;
//! public keys are cached per contact on first verification, but the
//! contact's own node remains authoritative.
//!
//! Decoded private material lives in zeroized buffers only for the duration
//! of a signing operation.

use crate::error::{Error, Result};
use crate::identity::ContactId;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Size of Ed25519 keys in bytes.
pub const ED25519_KEY_SIZE: usize = 32;

/// Whether a key record holds public or private material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    /// Shareable verification key.
    Public,
    /// Local signing key. Never leaves the node.
    Private,
}

impl KeyKind {
    /// Stable string form, used as a storage discriminator.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::Public => "public",
            KeyKind::Private => "private",
        }
    }

    /// Parse from the stable string form.
    pub fn from_str_value(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(KeyKind::Public),
            "private" => Ok(KeyKind::Private),
            other => Err(Error::Encoding(format!("unknown key kind: {}", other))),
        }
    }
}

/// A stored key: owner, base64 material, and kind.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// The contact this key belongs to.
    pub owner: ContactId,
    /// Base64-encoded key material.
    pub material: String,
    /// Public or private.
    pub kind: KeyKind,
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("owner", &self.owner)
            .field("kind", &self.kind)
            .field("material", &crate::logging::Redacted(&self.material))
            .finish()
    }
}

/// Generate a fresh Ed25519 keypair for `owner`.
///
/// Returns `(public, private)` records ready to be persisted.
pub fn generate_keypair(owner: &ContactId) -> (KeyRecord, KeyRecord) {
    let signing = SigningKey::generate(&mut OsRng);
    let public = KeyRecord {
        owner: owner.clone(),
        material: encode_verifying_key(&signing.verifying_key()),
        kind: KeyKind::Public,
    };
    let private = KeyRecord {
        owner: owner.clone(),
        material: BASE64.encode(signing.to_bytes()),
        kind: KeyKind::Private,
    };
    (public, private)
}

/// Encode a verifying key as base64 material.
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    BASE64.encode(key.as_bytes())
}

/// Decode base64 material into a verifying key.
pub fn decode_verifying_key(material: &str) -> Result<VerifyingKey> {
    let bytes = BASE64
        .decode(material)
        .map_err(|e| Error::Encoding(format!("bad public key material: {}", e)))?;
    let bytes: [u8; ED25519_KEY_SIZE] = bytes
        .try_into()
        .map_err(|_| Error::Encoding("bad public key length".into()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| Error::Encoding(format!("bad public key: {}", e)))
}

/// Decode a private key record into a signing key.
///
/// Rejects records that are not [`KeyKind::Private`]. The intermediate
/// byte buffer is zeroized.
pub fn decode_signing_key(record: &KeyRecord) -> Result<SigningKey> {
    if record.kind != KeyKind::Private {
        return Err(Error::Encoding("key record is not a private key".into()));
    }
    let bytes = Zeroizing::new(
        BASE64
            .decode(&record.material)
            .map_err(|e| Error::Encoding(format!("bad private key material: {}", e)))?,
    );
    let bytes: &[u8; ED25519_KEY_SIZE] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::Encoding("bad private key length".into()))?;
    Ok(SigningKey::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_roundtrip() {
        let owner = ContactId::new("a1");
        let (public, private) = generate_keypair(&owner);

        assert_eq!(public.kind, KeyKind::Public);
        assert_eq!(private.kind, KeyKind::Private);

        let signing = decode_signing_key(&private).expect("should decode private");
        let verifying = decode_verifying_key(&public.material).expect("should decode public");
        assert_eq!(signing.verifying_key(), verifying);
    }

    #[test]
    fn test_decode_rejects_wrong_kind() {
        let owner = ContactId::new("a1");
        let (public, _) = generate_keypair(&owner);
        assert!(decode_signing_key(&public).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_verifying_key("not base64 !!!").is_err());
        assert!(decode_verifying_key(&BASE64.encode([0u8; 7])).is_err());
    }

    #[test]
    fn test_key_kind_string_form() {
        assert_eq!(KeyKind::from_str_value("public").expect("parse"), KeyKind::Public);
        assert_eq!(KeyKind::from_str_value("private").expect("parse"), KeyKind::Private);
        assert!(KeyKind::from_str_value("session").is_err());
    }

    #[test]
    fn test_debug_redacts_material() {
        let owner = ContactId::new("a1");
        let (_, private) = generate_keypair(&owner);
        let debug = format!("{:?}", private);
        assert!(!debug.contains(&private.material));
    }
}
