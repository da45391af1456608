//! Nostr relay message types.
//!
//! Client to relay: EVENT, REQ, CLOSE.
//! Relay to client: EVENT, NOTICE. Every other label is surfaced as
//! [`RelayMessage::Other`] and ignored by the pool.

use nostr::{Event, EventFilter};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when parsing relay messages.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(String),
}

/// Messages sent from client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Publish an event: ["EVENT", <event JSON>]
    Event(Event),

    /// Subscribe to events: ["REQ", <subscription_id>, <filter>]
    Req {
        subscription_id: String,
        filter: EventFilter,
    },

    /// Close a subscription: ["CLOSE", <subscription_id>]
    Close { subscription_id: String },
}

impl ClientMessage {
    /// Serialize to JSON array for sending to relay.
    pub fn to_json(&self) -> Result<String, MessageError> {
        let value = match self {
            ClientMessage::Event(event) => serde_json::json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filter,
            } => serde_json::json!(["REQ", subscription_id, serde_json::to_value(filter)?]),
            ClientMessage::Close { subscription_id } => {
                serde_json::json!(["CLOSE", subscription_id])
            }
        };
        Ok(value.to_string())
    }
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// Event matching a subscription: ["EVENT", <subscription_id>, <event JSON>]
    ///
    /// The event is kept undecoded until the subscription id has been routed.
    Event {
        subscription_id: String,
        event: Value,
    },

    /// Human-readable notice: ["NOTICE", <message>]
    Notice { message: String },

    /// Any other well-formed labelled frame (OK, EOSE, AUTH, ...)
    Other { label: String },
}

impl RelayMessage {
    /// Parse a text frame from the relay.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let arr: Vec<Value> =
            serde_json::from_str(json).map_err(|e| MessageError::InvalidFormat(e.to_string()))?;

        if arr.len() < 2 {
            return Err(MessageError::InvalidFormat(
                "message is not an array of 2 or more".to_string(),
            ));
        }

        let label = arr[0]
            .as_str()
            .ok_or_else(|| MessageError::InvalidFormat("first element not a string".to_string()))?;

        match label {
            "EVENT" => {
                if arr.len() < 3 {
                    return Err(MessageError::MissingField("event".to_string()));
                }
                let subscription_id = arr[1]
                    .as_str()
                    .ok_or_else(|| {
                        MessageError::InvalidFormat("subscription_id not a string".to_string())
                    })?
                    .to_string();
                Ok(RelayMessage::Event {
                    subscription_id,
                    event: arr[2].clone(),
                })
            }
            "NOTICE" => {
                let message = arr[1]
                    .as_str()
                    .ok_or_else(|| MessageError::InvalidFormat("message not a string".to_string()))?
                    .to_string();
                Ok(RelayMessage::Notice { message })
            }
            other => Ok(RelayMessage::Other {
                label: other.to_string(),
            }),
        }
    }
}

/// A notice received from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeMessage {
    /// Normalized URL of the relay that sent the notice
    pub relay: String,
    /// Notice text
    pub message: String,
}

impl NoticeMessage {
    /// Decode a `["NOTICE", <text>]` frame. The tag is case-sensitive.
    pub fn from_frame(relay: impl Into<String>, json: &str) -> Result<Self, MessageError> {
        match RelayMessage::from_json(json)? {
            RelayMessage::Notice { message } => Ok(Self {
                relay: relay.into(),
                message,
            }),
            RelayMessage::Event { .. } => Err(MessageError::UnknownType("EVENT".to_string())),
            RelayMessage::Other { label } => Err(MessageError::UnknownType(label)),
        }
    }

    /// Encode as the `["NOTICE", <text>]` wire frame.
    pub fn to_frame(&self) -> String {
        serde_json::json!(["NOTICE", self.message]).to_string()
    }
}

/// A verified event routed to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    /// Normalized URL of the relay the event came from
    pub relay: String,
    pub event: Event,
}
