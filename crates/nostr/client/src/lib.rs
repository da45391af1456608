//! Nostr relay pool.
//!
//! This crate provides:
//! - One WebSocket connection per relay, each with its own read-loop
//! - Per-relay read/write policies with per-subscription overrides
//! - Subscriptions fanned out over readable relays, merged into one stream
//! - Publishing to every writable relay with a status per relay
//! - Notices from every relay on one broadcast channel
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr::{Event, EventFilter, generate_secret_key};
//! use nostr_client::{Policy, RelayPool};
//!
//! #[tokio::main]
//! async fn main() -> nostr_client::Result<()> {
//!     let pool = RelayPool::new();
//!     pool.add_relay("wss://relay.damus.io", None).await?;
//!     pool.add_relay("wss://nos.lol", Some(Policy::read_only())).await?;
//!
//!     let mut notices = pool.notices();
//!     tokio::spawn(async move {
//!         while let Ok(notice) = notices.recv().await {
//!             println!("{}: {}", notice.relay, notice.message);
//!         }
//!     });
//!
//!     // Subscribe to kind 1 (text notes)
//!     let mut sub = pool.subscribe(EventFilter::new().kinds([1]).limit(10)).await;
//!
//!     pool.set_secret_key(generate_secret_key()).await;
//!     let (event, mut statuses) = pool.publish(Event::new(1, vec![], "hello")).await?;
//!     while let Some(status) = statuses.recv().await {
//!         println!("{} -> {}: {:?}", event.id, status.relay, status.status);
//!     }
//!
//!     while let Some(message) = sub.recv().await {
//!         println!("Received event {} from {}", message.event.id, message.relay);
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod message;
mod policy;
mod pool;
mod relay;
mod subscription;
mod transport;

// Re-export main types
pub use config::{PoolConfig, RelaySpec};
pub use error::{ClientError, Result};
pub use message::{
    ClientMessage, EventMessage, MessageError, NoticeMessage, RelayMessage,
};
pub use policy::{Policy, SimplePolicy};
pub use pool::{PUBLISH_OBSERVATION_WINDOW, PublishState, PublishStatus, RelayPool};
pub use relay::{ConnectionState, RelayConnection};
pub use subscription::{Subscription, generate_subscription_id};
pub use transport::{
    Frame, FrameSink, FrameStream, Transport, TransportError, WebSocketTransport,
};

/// Default relays.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
    "wss://nostr.wine",
];

/// Configuration listing the default relays, all read/write.
pub fn default_config() -> PoolConfig {
    DEFAULT_RELAYS
        .iter()
        .fold(PoolConfig::default(), |config, url| {
            config.with_relay(*url, Policy::default())
        })
}

/// Create a relay pool configured with the default relays.
pub fn default_pool() -> RelayPool {
    RelayPool::with_config(default_config())
}
