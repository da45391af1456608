//! Single relay connection and its read-loop.
//!
//! A [`RelayConnection`] is a cheap, cloneable handle over the write half of
//! one relay connection. The read half is owned by [`run_read_loop`], which
//! demultiplexes inbound frames into the notice channel or the matching
//! subscription stream until the first read failure.

use crate::error::{ClientError, Result};
use crate::message::{ClientMessage, EventMessage, NoticeMessage, RelayMessage};
use crate::pool::SharedRegistry;
use crate::transport::{Frame, FrameSink, FrameStream, TransportError};
use nostr::Event;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info, trace, warn};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Read-loop running, frames can be written
    Connected,
    /// Closed by the pool or ended by a read failure. Never reconnects.
    Disconnected,
}

/// Handle to one relay connection.
#[derive(Clone)]
pub struct RelayConnection {
    url: String,
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
    state: Arc<RwLock<ConnectionState>>,
}

impl fmt::Debug for RelayConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConnection")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RelayConnection {
    pub(crate) fn new(url: String, sink: Box<dyn FrameSink>) -> Self {
        Self {
            url,
            sink: Arc::new(Mutex::new(sink)),
            state: Arc::new(RwLock::new(ConnectionState::Connected)),
        }
    }

    /// Normalized relay URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Send a protocol message to the relay.
    pub async fn send(&self, message: &ClientMessage) -> Result<()> {
        let text = message.to_json()?;
        self.send_text(text)
            .await
            .map_err(|source| ClientError::WriteFailed {
                url: self.url.clone(),
                source,
            })
    }

    pub(crate) async fn send_text(&self, text: String) -> std::result::Result<(), TransportError> {
        debug!("Sending to {}: {}", self.url, text);
        self.send_frame(Frame::Text(text)).await
    }

    async fn send_frame(&self, frame: Frame) -> std::result::Result<(), TransportError> {
        if !self.is_connected().await {
            return Err(TransportError::Closed);
        }
        self.sink.lock().await.send(frame).await
    }

    /// Close the connection. The read-loop ends once the transport reports
    /// the close.
    pub async fn close(&self) {
        *self.state.write().await = ConnectionState::Disconnected;
        if let Err(e) = self.sink.lock().await.close().await {
            debug!("Error closing connection to {}: {}", self.url, e);
        }
    }

    async fn mark_disconnected(&self) {
        *self.state.write().await = ConnectionState::Disconnected;
    }
}

/// Read frames from one relay until the transport fails or closes.
pub(crate) async fn run_read_loop(
    connection: RelayConnection,
    mut frames: Box<dyn FrameStream>,
    registry: SharedRegistry,
    notices: broadcast::Sender<NoticeMessage>,
) {
    let relay = connection.url().to_string();

    loop {
        let frame = match frames.next_frame().await {
            Ok(frame) => frame,
            Err(TransportError::Closed) => {
                info!("Relay {} closed connection", relay);
                break;
            }
            Err(e) => {
                warn!("Read error from {}: {}", relay, e);
                break;
            }
        };

        match frame {
            Frame::Ping(data) => {
                if let Err(e) = connection.send_frame(Frame::Pong(data)).await {
                    debug!("Failed to answer ping from {}: {}", relay, e);
                }
            }
            Frame::Text(text) => dispatch_text(&relay, &text, &registry, &notices).await,
            Frame::Close => {
                info!("Relay {} closed connection", relay);
                break;
            }
            Frame::Binary(_) | Frame::Pong(_) => {}
        }
    }

    connection.mark_disconnected().await;
}

async fn dispatch_text(
    relay: &str,
    text: &str,
    registry: &SharedRegistry,
    notices: &broadcast::Sender<NoticeMessage>,
) {
    if !text.starts_with('[') {
        return;
    }

    let message = match RelayMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            trace!("Ignoring frame from {}: {}", relay, e);
            return;
        }
    };

    match message {
        RelayMessage::Notice { message } => {
            // No receivers is fine, notices are best-effort
            let _ = notices.send(NoticeMessage {
                relay: relay.to_string(),
                message,
            });
        }
        RelayMessage::Event {
            subscription_id,
            event,
        } => route_event(relay, &subscription_id, event, registry).await,
        RelayMessage::Other { label } => {
            trace!("Ignoring {} frame from {}", label, relay);
        }
    }
}

async fn route_event(relay: &str, subscription_id: &str, raw: Value, registry: &SharedRegistry) {
    let events = {
        let registry = registry.read().await;
        match registry.subscriptions.get(subscription_id) {
            Some(subscription) if subscription.has_relay(relay) => subscription.sender(),
            _ => {
                trace!(
                    "No subscription {} bound to {}, ignoring event",
                    subscription_id, relay
                );
                return;
            }
        }
    };

    let event: Event = match serde_json::from_value(raw) {
        Ok(event) => event,
        Err(e) => {
            debug!("Undecodable event from {} on {}: {}", relay, subscription_id, e);
            return;
        }
    };

    if !matches!(event.check_signature(), Ok(true)) {
        debug!("Discarding event {} from {}: bad signature", event.id, relay);
        return;
    }

    match events.try_send(EventMessage {
        relay: relay.to_string(),
        event,
    }) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            warn!(
                "Subscription {} is full, dropping event {} from {}",
                subscription_id, dropped.event.id, relay
            );
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Subscription {} receiver dropped", subscription_id);
        }
    }
}
