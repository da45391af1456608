//! Subscription bookkeeping and the caller-facing subscription handle.

use crate::message::EventMessage;
use crate::pool::RelayPool;
use crate::relay::RelayConnection;
use nostr::EventFilter;
use rand::RngCore;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Random bytes behind a subscription id.
const SUBSCRIPTION_ID_BYTES: usize = 7;

/// Generate a subscription ID: 14 lowercase hex chars.
pub fn generate_subscription_id() -> String {
    let mut bytes = [0u8; SUBSCRIPTION_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Registry entry for one open subscription.
///
/// Holds the sending half of the subscription stream. Removing the entry from
/// the registry drops it and ends the stream.
#[derive(Debug)]
pub(crate) struct SubscriptionEntry {
    pub(crate) filter: EventFilter,
    relays: HashMap<String, RelayConnection>,
    events: mpsc::Sender<EventMessage>,
}

impl SubscriptionEntry {
    pub(crate) fn new(
        filter: EventFilter,
        relays: HashMap<String, RelayConnection>,
        events: mpsc::Sender<EventMessage>,
    ) -> Self {
        Self {
            filter,
            relays,
            events,
        }
    }

    /// Bind a relay to this subscription.
    pub(crate) fn join(&mut self, relay_url: &str, connection: RelayConnection) {
        self.relays.insert(relay_url.to_string(), connection);
    }

    /// Unbind a relay, returning its connection if it was bound.
    pub(crate) fn leave(&mut self, relay_url: &str) -> Option<RelayConnection> {
        self.relays.remove(relay_url)
    }

    pub(crate) fn has_relay(&self, relay_url: &str) -> bool {
        self.relays.contains_key(relay_url)
    }

    pub(crate) fn relay_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.relays.keys().cloned().collect();
        urls.sort();
        urls
    }

    pub(crate) fn connections(&self) -> impl Iterator<Item = &RelayConnection> {
        self.relays.values()
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<EventMessage> {
        self.events.clone()
    }
}

/// An open subscription.
///
/// Yields verified events from every relay bound to it. The stream ends after
/// [`Subscription::unsubscribe`] or [`RelayPool::unsubscribe`] with this id.
pub struct Subscription {
    id: String,
    filter: EventFilter,
    events: mpsc::Receiver<EventMessage>,
    pool: RelayPool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        filter: EventFilter,
        events: mpsc::Receiver<EventMessage>,
        pool: RelayPool,
    ) -> Self {
        Self {
            id,
            filter,
            events,
            pool,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Wait for the next event. Returns `None` once the subscription is closed
    /// and every buffered event has been taken.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Result<EventMessage, TryRecvError> {
        self.events.try_recv()
    }

    /// Relays currently bound to this subscription.
    pub async fn relays(&self) -> Vec<String> {
        self.pool.subscription_relays(&self.id).await
    }

    /// Close the subscription on every bound relay.
    pub async fn unsubscribe(self) -> bool {
        self.pool.unsubscribe(&self.id).await
    }
}
