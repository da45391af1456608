//! Nostr protocol primitives used by the relay pool.
//!
//! This crate provides:
//! - NIP-01: signed events (id hashing, Schnorr signing, verification)
//! - NIP-01: subscription filters
//! - Relay URL normalization

mod filter;
mod nip01;
mod relay_url;

pub use filter::EventFilter;
pub use nip01::{
    Event, KIND_METADATA, KIND_SHORT_TEXT_NOTE, Nip01Error, generate_secret_key,
    get_public_key_hex, secret_key_from_hex,
};
pub use relay_url::normalize_url;
