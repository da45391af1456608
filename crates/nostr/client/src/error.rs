//! Client error types

use crate::message::MessageError;
use crate::transport::TransportError;
use nostr::Nip01Error;
use thiserror::Error;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// URL rejected by normalization
    #[error("Invalid relay URL: '{0}'")]
    InvalidUrl(String),

    /// Transport dial failed
    #[error("Error opening connection to '{url}': {source}")]
    ConnectFailed {
        url: String,
        #[source]
        source: TransportError,
    },

    /// Unsigned event and no secret key configured
    #[error("Publishing needs either a signed event or a configured secret key")]
    NoSigningKey,

    /// Signing with the configured key failed
    #[error("Error signing event: {0}")]
    SignFailed(#[from] Nip01Error),

    /// A frame could not be written to a relay
    #[error("Error writing to '{url}': {source}")]
    WriteFailed {
        url: String,
        #[source]
        source: TransportError,
    },

    /// Subscription id already in use
    #[error("Subscription already exists: {0}")]
    DuplicateSubscription(String),

    /// Wire message encoding error
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;
