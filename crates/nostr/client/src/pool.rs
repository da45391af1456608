//! Relay pool for managing connections to multiple Nostr relays.
//!
//! The pool owns one connection per relay URL. Subscriptions fan out to every
//! readable relay and merge their events into one stream. Publishing fans out
//! to every writable relay and reports a status per relay.

use crate::config::PoolConfig;
use crate::error::{ClientError, Result};
use crate::message::{ClientMessage, NoticeMessage};
use crate::policy::Policy;
use crate::relay::{ConnectionState, RelayConnection, run_read_loop};
use crate::subscription::{Subscription, SubscriptionEntry, generate_subscription_id};
use crate::transport::{Transport, TransportError, WebSocketTransport};
use nostr::{Event, EventFilter, normalize_url};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

/// How long a relay is watched for the echo of an event it accepted.
pub const PUBLISH_OBSERVATION_WINDOW: Duration = Duration::from_secs(5);

/// Outcome of publishing to one relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    /// The event frame was written to the relay
    Sent,
    /// Writing the event frame failed
    Failed,
}

/// Per-relay publish status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishStatus {
    pub relay: String,
    pub status: PublishState,
}

/// One relay in the pool.
pub(crate) struct RelayEntry {
    pub(crate) policy: Policy,
    pub(crate) connection: RelayConnection,
}

/// Shared pool state. Relays and subscriptions live under one lock so a
/// relay's membership in subscriptions changes together with the relay set.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) relays: HashMap<String, RelayEntry>,
    pub(crate) subscriptions: HashMap<String, SubscriptionEntry>,
}

pub(crate) type SharedRegistry = Arc<RwLock<Registry>>;

impl Registry {
    fn fresh_subscription_id(&self) -> String {
        loop {
            let id = generate_subscription_id();
            if !self.subscriptions.contains_key(&id) {
                return id;
            }
        }
    }

    /// Connections of every relay whose policy reads `subscription_id`.
    fn readers(&self, subscription_id: &str) -> HashMap<String, RelayConnection> {
        self.relays
            .iter()
            .filter(|(_, entry)| entry.policy.can_read(subscription_id))
            .map(|(url, entry)| (url.clone(), entry.connection.clone()))
            .collect()
    }
}

/// A pool of Nostr relay connections.
#[derive(Clone)]
pub struct RelayPool {
    registry: SharedRegistry,
    transport: Arc<dyn Transport>,
    /// Key used to sign unsigned events on publish
    secret_key: Arc<RwLock<Option<[u8; 32]>>>,
    /// Notices from every relay
    notices_tx: broadcast::Sender<NoticeMessage>,
    config: Arc<PoolConfig>,
}

impl Default for RelayPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayPool {
    /// Create an empty pool with default configuration.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create an empty pool. Configured relays are not connected until
    /// [`RelayPool::connect_configured`].
    pub fn with_config(config: PoolConfig) -> Self {
        Self::with_transport(config, Arc::new(WebSocketTransport))
    }

    /// Create an empty pool that dials relays through `transport`.
    pub fn with_transport(config: PoolConfig, transport: Arc<dyn Transport>) -> Self {
        let (notices_tx, _) = broadcast::channel(config.notice_buffer.max(1));
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            transport,
            secret_key: Arc::new(RwLock::new(None)),
            notices_tx,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Set the key used to sign unsigned events on publish.
    pub async fn set_secret_key(&self, secret_key: [u8; 32]) {
        *self.secret_key.write().await = Some(secret_key);
    }

    pub async fn has_secret_key(&self) -> bool {
        self.secret_key.read().await.is_some()
    }

    /// Receive notices from every relay in the pool.
    ///
    /// A receiver that falls behind loses the oldest notices and sees
    /// `RecvError::Lagged`.
    pub fn notices(&self) -> broadcast::Receiver<NoticeMessage> {
        self.notices_tx.subscribe()
    }

    /// Get all relay URLs in the pool, sorted.
    pub async fn relay_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.registry.read().await.relays.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Get the policy of a relay.
    pub async fn policy(&self, url: &str) -> Option<Policy> {
        let url = normalize_url(url)?;
        self.registry
            .read()
            .await
            .relays
            .get(&url)
            .map(|entry| entry.policy.clone())
    }

    /// Get connection states for all relays.
    pub async fn states(&self) -> HashMap<String, ConnectionState> {
        let connections: Vec<RelayConnection> = self
            .registry
            .read()
            .await
            .relays
            .values()
            .map(|entry| entry.connection.clone())
            .collect();

        let mut states = HashMap::new();
        for conn in connections {
            states.insert(conn.url().to_string(), conn.state().await);
        }
        states
    }

    /// Check if a relay is connected.
    pub async fn is_connected(&self, url: &str) -> bool {
        let Some(url) = normalize_url(url) else {
            return false;
        };
        let conn = self
            .registry
            .read()
            .await
            .relays
            .get(&url)
            .map(|entry| entry.connection.clone());
        match conn {
            Some(conn) => conn.is_connected().await,
            None => false,
        }
    }

    /// Number of relays whose read-loop is still running.
    pub async fn connected_count(&self) -> usize {
        self.states()
            .await
            .values()
            .filter(|state| **state == ConnectionState::Connected)
            .count()
    }

    /// Ids of every open subscription, sorted.
    pub async fn subscription_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registry
            .read()
            .await
            .subscriptions
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Relays bound to a subscription, sorted. Empty if the subscription is
    /// not open.
    pub async fn subscription_relays(&self, subscription_id: &str) -> Vec<String> {
        self.registry
            .read()
            .await
            .subscriptions
            .get(subscription_id)
            .map(SubscriptionEntry::relay_urls)
            .unwrap_or_default()
    }

    /// Add a relay to the pool and connect to it.
    ///
    /// Without a policy the relay reads and writes. The relay joins every open
    /// subscription unless its policy overrides reading off for that id.
    /// Re-adding a URL replaces the existing connection.
    pub async fn add_relay(&self, url: &str, policy: Option<Policy>) -> Result<()> {
        let url = normalize_url(url).ok_or_else(|| ClientError::InvalidUrl(url.to_string()))?;
        let policy = policy.unwrap_or_default();
        info!("Adding relay to pool: {}", url);

        let connect_timeout = self.config.connect_timeout();
        let (sink, frames) = match timeout(connect_timeout, self.transport.dial(&url)).await {
            Ok(Ok(halves)) => halves,
            Ok(Err(source)) => return Err(ClientError::ConnectFailed { url, source }),
            Err(_) => {
                return Err(ClientError::ConnectFailed {
                    url,
                    source: TransportError::Timeout(connect_timeout),
                });
            }
        };
        let connection = RelayConnection::new(url.clone(), sink);

        let (previous, joined) = {
            let mut registry = self.registry.write().await;
            let mut joined = Vec::new();
            for (id, subscription) in registry.subscriptions.iter_mut() {
                if policy.joins_existing(id) {
                    subscription.join(&url, connection.clone());
                    joined.push((id.clone(), subscription.filter.clone()));
                } else {
                    subscription.leave(&url);
                }
            }
            let previous = registry.relays.insert(
                url.clone(),
                RelayEntry {
                    policy,
                    connection: connection.clone(),
                },
            );
            (previous, joined)
        };

        if let Some(previous) = previous {
            debug!("Replacing existing connection to {}", url);
            previous.connection.close().await;
        }

        for (subscription_id, filter) in joined {
            let req = ClientMessage::Req {
                subscription_id,
                filter,
            };
            if let Err(e) = connection.send(&req).await {
                warn!("Failed to subscribe on {}: {}", url, e);
            }
        }

        tokio::spawn(run_read_loop(
            connection,
            frames,
            self.registry.clone(),
            self.notices_tx.clone(),
        ));

        Ok(())
    }

    /// Connect every relay listed in the configuration. Returns the outcome
    /// per configured URL; one failure does not stop the others.
    pub async fn connect_configured(&self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::with_capacity(self.config.relays.len());
        for spec in &self.config.relays {
            let result = self.add_relay(&spec.url, Some(spec.policy.clone())).await;
            if let Err(e) = &result {
                warn!("Failed to connect to {}: {}", spec.url, e);
            }
            results.push((spec.url.clone(), result));
        }
        results
    }

    /// Remove a relay from the pool, closing its subscriptions and connection.
    /// Unknown URLs are ignored.
    pub async fn remove_relay(&self, url: &str) {
        let Some(url) = normalize_url(url) else {
            return;
        };

        let (entry, detached) = {
            let mut registry = self.registry.write().await;
            let entry = registry.relays.remove(&url);
            let detached: Vec<String> = registry
                .subscriptions
                .iter_mut()
                .filter_map(|(id, subscription)| subscription.leave(&url).map(|_| id.clone()))
                .collect();
            (entry, detached)
        };

        let Some(entry) = entry else {
            return;
        };
        info!("Removing relay from pool: {}", url);

        for subscription_id in detached {
            let close = ClientMessage::Close { subscription_id };
            if let Err(e) = entry.connection.send(&close).await {
                debug!("Failed to close subscription on {}: {}", url, e);
            }
        }
        entry.connection.close().await;
    }

    /// Remove every relay from the pool. Open subscriptions stay open with no
    /// relays bound.
    pub async fn disconnect_all(&self) {
        for url in self.relay_urls().await {
            self.remove_relay(&url).await;
        }
    }

    /// Replace the policy of a relay already in the pool.
    ///
    /// Open subscriptions are only touched where the new policy has an
    /// explicit override: the relay joins those it may now read and leaves
    /// those it may not. Returns false for unknown URLs.
    pub async fn set_policy(&self, url: &str, policy: Policy) -> bool {
        let Some(url) = normalize_url(url) else {
            return false;
        };

        let (connection, joined, left) = {
            let mut registry = self.registry.write().await;
            let Registry {
                relays,
                subscriptions,
            } = &mut *registry;
            let Some(entry) = relays.get_mut(&url) else {
                return false;
            };

            let mut joined = Vec::new();
            let mut left = Vec::new();
            for (id, subscription) in subscriptions.iter_mut() {
                match policy.read_override(id) {
                    Some(true) if !subscription.has_relay(&url) => {
                        subscription.join(&url, entry.connection.clone());
                        joined.push((id.clone(), subscription.filter.clone()));
                    }
                    Some(false) => {
                        if subscription.leave(&url).is_some() {
                            left.push(id.clone());
                        }
                    }
                    _ => {}
                }
            }
            entry.policy = policy;
            (entry.connection.clone(), joined, left)
        };

        debug!(
            "Policy of {} updated: joined {}, left {}",
            url,
            joined.len(),
            left.len()
        );
        for (subscription_id, filter) in joined {
            let req = ClientMessage::Req {
                subscription_id,
                filter,
            };
            if let Err(e) = connection.send(&req).await {
                warn!("Failed to subscribe on {}: {}", url, e);
            }
        }
        for subscription_id in left {
            let close = ClientMessage::Close { subscription_id };
            if let Err(e) = connection.send(&close).await {
                warn!("Failed to unsubscribe on {}: {}", url, e);
            }
        }
        true
    }

    /// Subscribe on every relay whose policy reads the new subscription.
    pub async fn subscribe(&self, filter: EventFilter) -> Subscription {
        let (subscription, connections) = {
            let mut registry = self.registry.write().await;
            let id = registry.fresh_subscription_id();
            let connections = registry.readers(&id);
            let subscription = self.register(&mut registry, id, filter, connections.clone());
            (subscription, connections)
        };
        Self::request(&subscription, connections.values()).await;
        subscription
    }

    /// Subscribe under a caller-chosen id. Relays with an override for that id
    /// follow it.
    pub async fn subscribe_with_id(
        &self,
        subscription_id: impl Into<String>,
        filter: EventFilter,
    ) -> Result<Subscription> {
        let id = subscription_id.into();
        let (subscription, connections) = {
            let mut registry = self.registry.write().await;
            if registry.subscriptions.contains_key(&id) {
                return Err(ClientError::DuplicateSubscription(id));
            }
            let connections = registry.readers(&id);
            let subscription = self.register(&mut registry, id, filter, connections.clone());
            (subscription, connections)
        };
        Self::request(&subscription, connections.values()).await;
        Ok(subscription)
    }

    /// Subscribe on a single relay, ignoring its policy. The subscription has
    /// no relays if `url` is not in the pool.
    async fn subscribe_on(&self, url: &str, filter: EventFilter) -> Subscription {
        let (subscription, connections) = {
            let mut registry = self.registry.write().await;
            let id = registry.fresh_subscription_id();
            let connections: HashMap<String, RelayConnection> = registry
                .relays
                .get(url)
                .map(|entry| (url.to_string(), entry.connection.clone()))
                .into_iter()
                .collect();
            let subscription = self.register(&mut registry, id, filter, connections.clone());
            (subscription, connections)
        };
        Self::request(&subscription, connections.values()).await;
        subscription
    }

    fn register(
        &self,
        registry: &mut Registry,
        id: String,
        filter: EventFilter,
        connections: HashMap<String, RelayConnection>,
    ) -> Subscription {
        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer.max(1));
        registry.subscriptions.insert(
            id.clone(),
            SubscriptionEntry::new(filter.clone(), connections, events_tx),
        );
        Subscription::new(id, filter, events_rx, self.clone())
    }

    async fn request<'a>(
        subscription: &Subscription,
        connections: impl Iterator<Item = &'a RelayConnection>,
    ) {
        let req = ClientMessage::Req {
            subscription_id: subscription.id().to_string(),
            filter: subscription.filter().clone(),
        };
        let mut sent = 0;
        for conn in connections {
            match conn.send(&req).await {
                Ok(()) => sent += 1,
                Err(e) => warn!("Failed to subscribe on {}: {}", conn.url(), e),
            }
        }
        info!("Subscription {} sent to {} relays", subscription.id(), sent);
    }

    /// Close a subscription on every bound relay and end its stream.
    /// Returns false if no subscription has this id.
    pub async fn unsubscribe(&self, subscription_id: &str) -> bool {
        let Some(entry) = self.registry.write().await.subscriptions.remove(subscription_id) else {
            return false;
        };
        info!("Closing subscription {}", subscription_id);

        let close = ClientMessage::Close {
            subscription_id: subscription_id.to_string(),
        };
        for conn in entry.connections() {
            if let Err(e) = conn.send(&close).await {
                warn!("Failed to unsubscribe {} on {}: {}", subscription_id, conn.url(), e);
            }
        }
        true
    }

    /// Publish an event to every writable relay.
    ///
    /// Unsigned events are signed with the configured secret key first. The
    /// returned event carries the final id and signature. The receiver yields
    /// one status per writable relay and closes after the last one.
    pub async fn publish(&self, mut event: Event) -> Result<(Event, mpsc::Receiver<PublishStatus>)> {
        if !event.is_signed() {
            let secret_key = (*self.secret_key.read().await).ok_or(ClientError::NoSigningKey)?;
            event.sign(&secret_key)?;
        }
        let frame = ClientMessage::Event(event.clone()).to_json()?;

        let targets: Vec<RelayConnection> = self
            .registry
            .read()
            .await
            .relays
            .values()
            .filter(|entry| entry.policy.write())
            .map(|entry| entry.connection.clone())
            .collect();
        info!("Publishing event {} to {} relays", event.id, targets.len());

        let (status_tx, status_rx) = mpsc::channel(targets.len().max(1));
        for conn in targets {
            let pool = self.clone();
            let frame = frame.clone();
            let status_tx = status_tx.clone();
            let event_id = event.id.clone();

            tokio::spawn(async move {
                let relay = conn.url().to_string();
                if let Err(e) = conn.send_text(frame).await {
                    warn!("Error sending event {} to {}: {}", event_id, relay, e);
                    let _ = status_tx
                        .send(PublishStatus {
                            relay,
                            status: PublishState::Failed,
                        })
                        .await;
                    return;
                }

                let _ = status_tx
                    .send(PublishStatus {
                        relay: relay.clone(),
                        status: PublishState::Sent,
                    })
                    .await;
                drop(status_tx);

                pool.observe_publication(&relay, &event_id).await;
            });
        }

        Ok((event, status_rx))
    }

    /// Watch one relay for the echo of a published event, then close the
    /// watching subscription.
    async fn observe_publication(&self, relay: &str, event_id: &str) {
        let mut subscription = self
            .subscribe_on(relay, EventFilter::new().ids([event_id]))
            .await;

        let deadline = Instant::now() + PUBLISH_OBSERVATION_WINDOW;
        while let Ok(Some(message)) = timeout_at(deadline, subscription.recv()).await {
            debug!("Relay {} echoed event {}", message.relay, message.event.id);
        }

        subscription.unsubscribe().await;
    }
}
