//! The per-message signature chain.
//!
//! Every signer signs the canonical bytes of the message as it looked at
//! signing time: the payload plus all *older* signatures. New signatures
//! are prepended, so the list is ordered newest first and each forwarding
//! node can add its own signature without invalidating earlier ones.
//!
//! Replies and the edit timestamp are excluded from the canonical bytes:
//! both are appended after signing by design, while any change to the
//! signed payload itself breaks verification.
//!
//! Verification fails closed. An unsigned message, a malformed signature,
//! or an unresolvable signer key all reject the message.

use crate::crypto::keys::{decode_signing_key, decode_verifying_key, KeyKind, KeyRecord};
use crate::error::{Error, Result};
use crate::identity::{ContactId, Location};
use crate::logging::RedactedLocation;
use crate::messaging::{ChatId, Message, MessageBody, MessageId};
use crate::storage::KeyStore;
use crate::transport::Transport;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signature, Signer, VerifyingKey};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// The signed portion of a message: everything except replies and the
/// edit timestamp, with the signature list truncated to the signatures
/// older than the one being produced or checked.
#[derive(Serialize)]
struct SigningView<'a> {
    id: &'a MessageId,
    from: &'a ContactId,
    to: &'a ChatId,
    body: &'a MessageBody,
    timestamp: i64,
    subject: &'a Option<MessageId>,
    signatures: &'a [String],
}

/// Canonical bytes of `message` with only `older_signatures` present.
pub fn canonical_bytes(message: &Message, older_signatures: &[String]) -> Result<Vec<u8>> {
    let view = SigningView {
        id: &message.id,
        from: &message.from,
        to: &message.to,
        body: &message.body,
        timestamp: message.timestamp,
        subject: &message.subject,
        signatures: older_signatures,
    };
    bincode::serialize(&view).map_err(|e| Error::Encoding(e.to_string()))
}

/// Signs outbound messages and verifies inbound signature chains,
/// resolving signer public keys through the key cache and, on a miss,
/// a one-shot fetch from the signer's node.
pub struct SignatureChain {
    local: ContactId,
    keys: Arc<dyn KeyStore>,
    transport: Arc<dyn Transport>,
}

impl SignatureChain {
    /// Create a chain bound to the local identity.
    pub fn new(local: ContactId, keys: Arc<dyn KeyStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            local,
            keys,
            transport,
        }
    }

    /// Sign a message with the local private key, prepending the new
    /// signature to the chain.
    ///
    /// An absent private key is a fatal send precondition and returns
    /// [`Error::NoPrivateKey`]; it is never silently skipped.
    pub async fn sign(&self, mut message: Message) -> Result<Message> {
        let record = self
            .keys
            .private_key(&self.local)
            .await?
            .ok_or(Error::NoPrivateKey)?;
        let key = decode_signing_key(&record)?;
        let bytes = canonical_bytes(&message, &message.signatures)?;
        let signature = key.sign(&bytes);
        message
            .signatures
            .insert(0, BASE64.encode(signature.to_bytes()));
        Ok(message)
    }

    /// Verify the signature at `index` against `key`.
    ///
    /// Index 0 checks the most recent signer; higher indices reconstruct
    /// the message state as earlier signers saw it.
    pub fn verify_at(message: &Message, index: usize, key: &VerifyingKey) -> Result<()> {
        let encoded = message.signatures.get(index).ok_or_else(|| {
            Error::VerificationFailed(format!("no signature at index {}", index))
        })?;
        let older = &message.signatures[index + 1..];
        let bytes = canonical_bytes(message, older)?;
        let raw = BASE64
            .decode(encoded)
            .map_err(|_| Error::VerificationFailed("malformed signature".into()))?;
        let signature = Signature::from_slice(&raw)
            .map_err(|_| Error::VerificationFailed("malformed signature".into()))?;
        key.verify_strict(&bytes, &signature)
            .map_err(|_| Error::VerificationFailed("signature mismatch".into()))
    }

    /// Verify the newest signature as the claimed sender's.
    ///
    /// Key resolution order: the cached public key for `message.from`,
    /// otherwise one fetch from `location` followed by exactly one retry
    /// of the verification with the fetched-and-cached key. A fetch
    /// failure or missing key rejects the message.
    pub async fn verify_sender(
        &self,
        message: &Message,
        location: Option<&Location>,
    ) -> Result<()> {
        if message.signatures.is_empty() {
            return Err(Error::VerificationFailed("message is unsigned".into()));
        }

        if let Some(record) = self.keys.public_key(&message.from).await? {
            let key = decode_verifying_key(&record.material)
                .map_err(|_| Error::VerificationFailed("cached key is unusable".into()))?;
            return Self::verify_at(message, 0, &key);
        }

        let location = location.ok_or_else(|| {
            Error::VerificationFailed("no known location for signer".into())
        })?;
        debug!(
            signer = %message.from,
            location = %RedactedLocation(location.as_str()),
            "public key cache miss, fetching from signer"
        );
        let material = match self.transport.fetch_public_key(location).await {
            Ok(Some(material)) => material,
            Ok(None) => {
                return Err(Error::VerificationFailed(
                    "signer has no published key".into(),
                ))
            }
            Err(e) => {
                warn!(signer = %message.from, error = %e, "public key fetch failed");
                return Err(Error::VerificationFailed("public key fetch failed".into()));
            }
        };
        let key = decode_verifying_key(&material)
            .map_err(|_| Error::VerificationFailed("fetched key is unusable".into()))?;
        self.keys
            .save_key(&KeyRecord {
                owner: message.from.clone(),
                material,
                kind: KeyKind::Public,
            })
            .await?;
        Self::verify_at(message, 0, &key)
    }
}
