//! NIP-01: Basic protocol flow description.
//!
//! This module implements the signed event used across the relay pool:
//! - Event structure (id, pubkey, created_at, kind, tags, content, sig)
//! - Event serialization for hashing
//! - In-place signing with BIP-340 Schnorr signatures
//! - Signature and id verification

use bitcoin::hashes::{Hash, sha256};
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::{Keypair, Message, SecretKey, XOnlyPublicKey, schnorr};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during NIP-01 operations.
#[derive(Debug, Error)]
pub enum Nip01Error {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("verification error: {0}")]
    Verification(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
}

// Standard event kinds
pub const KIND_METADATA: u16 = 0;
pub const KIND_SHORT_TEXT_NOTE: u16 = 1;

/// A Nostr event. Unsigned until [`Event::sign`] fills `pubkey`, `id` and `sig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-bytes lowercase hex-encoded sha256 of the serialized event data
    #[serde(default)]
    pub id: String,
    /// 32-bytes lowercase hex-encoded public key of the event creator
    #[serde(default)]
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind (integer between 0 and 65535)
    pub kind: u16,
    /// Array of arrays of strings (tags)
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    #[serde(default)]
    pub content: String,
    /// 64-bytes lowercase hex signature
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// Create an unsigned event stamped with the current time.
    pub fn new(kind: u16, tags: Vec<Vec<String>>, content: impl Into<String>) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            id: String::new(),
            pubkey: String::new(),
            created_at,
            kind,
            tags,
            content: content.into(),
            sig: String::new(),
        }
    }

    /// Whether the event carries a signature. Says nothing about its validity.
    pub fn is_signed(&self) -> bool {
        !self.sig.is_empty()
    }

    /// Serialize the hashed part of the event.
    ///
    /// Format: `[0, pubkey, created_at, kind, tags, content]`
    pub fn serialize_for_id(&self) -> Result<String, Nip01Error> {
        if !is_lower_hex(&self.pubkey, 64) {
            return Err(Nip01Error::InvalidEvent(
                "can't serialize event with wrong or missing pubkey".to_string(),
            ));
        }

        serde_json::to_string(&(
            0,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))
        .map_err(|e| Nip01Error::Serialization(e.to_string()))
    }

    /// Compute the event id from its current contents.
    pub fn compute_id(&self) -> Result<String, Nip01Error> {
        let serialized = self.serialize_for_id()?;
        let hash = sha256::Hash::hash(serialized.as_bytes());
        Ok(hex::encode(hash.as_byte_array()))
    }

    /// Sign the event in place: derives `pubkey` from the key, then sets `id`
    /// and `sig`. Any previous values of those fields are replaced.
    pub fn sign(&mut self, secret_key: &[u8; 32]) -> Result<(), Nip01Error> {
        let secp = Secp256k1::new();
        let sk =
            SecretKey::from_slice(secret_key).map_err(|e| Nip01Error::Signing(e.to_string()))?;
        let keypair = Keypair::from_secret_key(&secp, &sk);
        let (xonly, _parity) = keypair.x_only_public_key();

        self.pubkey = hex::encode(xonly.serialize());
        let id = self.compute_id()?;

        let id_bytes =
            hex::decode(&id).map_err(|e| Nip01Error::Signing(format!("invalid id hex: {}", e)))?;
        let message = Message::from_digest_slice(&id_bytes)
            .map_err(|e| Nip01Error::Signing(format!("invalid message: {}", e)))?;
        let sig = secp.sign_schnorr_no_aux_rand(&message, &keypair);

        self.id = id;
        self.sig = hex::encode(sig.serialize());
        Ok(())
    }

    /// Verify the event id and signature.
    ///
    /// Returns `Ok(false)` for malformed fields, a mismatching id or a bad
    /// signature; `Err` only when well-formed hex fails to decode into a key
    /// or signature.
    pub fn check_signature(&self) -> Result<bool, Nip01Error> {
        if !is_lower_hex(&self.id, 64)
            || !is_lower_hex(&self.pubkey, 64)
            || !is_lower_hex(&self.sig, 128)
        {
            return Ok(false);
        }

        if self.compute_id()? != self.id {
            return Ok(false);
        }

        let secp = Secp256k1::verification_only();

        let id_bytes = hex::decode(&self.id)
            .map_err(|e| Nip01Error::Verification(format!("invalid id hex: {}", e)))?;
        let message = Message::from_digest_slice(&id_bytes)
            .map_err(|e| Nip01Error::Verification(format!("invalid message: {}", e)))?;

        let sig_bytes = hex::decode(&self.sig)
            .map_err(|e| Nip01Error::Verification(format!("invalid sig hex: {}", e)))?;
        let sig = schnorr::Signature::from_slice(&sig_bytes)
            .map_err(|e| Nip01Error::Verification(format!("invalid signature: {}", e)))?;

        let pubkey_bytes = hex::decode(&self.pubkey)
            .map_err(|e| Nip01Error::Verification(format!("invalid pubkey hex: {}", e)))?;
        let pubkey = XOnlyPublicKey::from_slice(&pubkey_bytes)
            .map_err(|e| Nip01Error::Verification(format!("invalid pubkey: {}", e)))?;

        Ok(secp.verify_schnorr(&sig, &message, &pubkey).is_ok())
    }
}

fn is_lower_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

/// Generate a random 32-byte secret key.
pub fn generate_secret_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Parse a 64-character hex secret key.
pub fn secret_key_from_hex(hex_key: &str) -> Result<[u8; 32], Nip01Error> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| Nip01Error::InvalidHex(e.to_string()))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Nip01Error::InvalidSecretKey("expected 32 bytes".to_string()))?;
    SecretKey::from_slice(&key).map_err(|e| Nip01Error::InvalidSecretKey(e.to_string()))?;
    Ok(key)
}

/// Get the x-only public key as a hex string from a secret key.
pub fn get_public_key_hex(secret_key: &[u8; 32]) -> Result<String, Nip01Error> {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(secret_key)
        .map_err(|e| Nip01Error::InvalidSecretKey(e.to_string()))?;
    let (xonly, _parity) = sk.x_only_public_key(&secp);
    Ok(hex::encode(xonly.serialize()))
}
