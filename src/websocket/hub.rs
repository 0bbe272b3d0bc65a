//! WebSocket Connection Hub
//!
//! Owns the registry of live clients and fans inbound payloads out to them.
//!
//! The registry sits behind a single mutex that is held only long enough to
//! insert, remove, or clone a snapshot of the outbound senders. Delivery uses
//! `try_send` on each client's bounded queue, so a slow consumer can never
//! stall the hub: a full queue gets the client disconnected instead.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::payload::Payload;
use super::routing::{FlatBroadcast, Recipients, RoutingStrategy};
use crate::auth::Identity;

/// Unique identifier for a WebSocket connection
pub type ClientId = Uuid;

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections accepted at handshake
    pub max_connections: usize,
    /// Capacity of each client's outbound queue
    pub queue_capacity: usize,
    /// Interval between keepalive pings sent by the writer pump
    pub ping_interval: Option<Duration>,
    /// Disconnect a client that sends nothing for this long
    pub idle_timeout: Option<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            queue_capacity: 256,
            ping_interval: None,
            idle_timeout: None,
        }
    }
}

/// Hub-side record of a connection
///
/// Holds the only long-lived sender of the client's outbound queue and the
/// sending half of its eviction signal. Dropping it (on unregister) closes
/// the queue and fires the signal, so the session ends even when its writer
/// is stuck on a socket that no longer drains.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: ClientId,
    pub identity: Identity,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Payload>,
    _evict: oneshot::Sender<()>,
}

impl ClientHandle {
    pub(crate) fn new(
        id: ClientId,
        identity: Identity,
        sender: mpsc::Sender<Payload>,
        evict: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            identity,
            connected_at: Utc::now(),
            sender,
            _evict: evict,
        }
    }
}

/// Summary of a live connection, for listings
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedClient {
    pub id: ClientId,
    pub user_id: i64,
    pub display_name: String,
    pub connected_at: DateTime<Utc>,
}

/// Why the hub dropped a client during fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    /// Outbound queue full
    SlowConsumer,
    /// Writer already gone
    Closed,
}

/// Outcome of a single broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients in the registry snapshot
    pub snapshot: usize,
    /// Payloads enqueued
    pub delivered: usize,
    /// Clients skipped by the routing strategy
    pub skipped: usize,
    /// Clients removed because their queue was full or closed
    pub pruned: Vec<(ClientId, PruneReason)>,
}

/// Running counters, exposed on the health endpoint
#[derive(Debug, Default)]
pub struct HubStats {
    registered: AtomicU64,
    unregistered: AtomicU64,
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    pruned_slow: AtomicU64,
    pruned_closed: AtomicU64,
}

/// Point-in-time copy of [`HubStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStatsSnapshot {
    pub registered: u64,
    pub unregistered: u64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub pruned_slow: u64,
    pub pruned_closed: u64,
}

impl HubStats {
    pub fn snapshot(&self) -> HubStatsSnapshot {
        HubStatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            pruned_slow: self.pruned_slow.load(Ordering::Relaxed),
            pruned_closed: self.pruned_closed.load(Ordering::Relaxed),
        }
    }
}

/// Manages all WebSocket connections and message fan-out
pub struct ConnectionHub {
    /// Active connections: ClientId → ClientHandle
    registry: Mutex<HashMap<ClientId, ClientHandle>>,
    /// Serializes broadcasts so every client sees them in call order
    fanout: Mutex<()>,
    /// Recipient selection
    routing: Arc<dyn RoutingStrategy>,
    stats: HubStats,
    config: HubConfig,
}

impl ConnectionHub {
    /// Create a hub that delivers every payload to every client
    pub fn new(config: HubConfig) -> Self {
        Self::with_routing(config, Arc::new(FlatBroadcast))
    }

    /// Create a hub with a custom routing strategy
    pub fn with_routing(config: HubConfig, routing: Arc<dyn RoutingStrategy>) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            fanout: Mutex::new(()),
            routing,
            stats: HubStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn routing_name(&self) -> &'static str {
        self.routing.name()
    }

    /// Register a connection
    ///
    /// Registering an id that is already present is a no-op; the duplicate
    /// handle is dropped.
    pub async fn register(&self, handle: ClientHandle) {
        let id = handle.id;
        let user_id = handle.identity.user_id;

        let inserted = {
            let mut registry = self.registry.lock().await;
            if registry.contains_key(&id) {
                false
            } else {
                registry.insert(id, handle);
                true
            }
        };

        if inserted {
            self.stats.registered.fetch_add(1, Ordering::Relaxed);
            tracing::info!(client_id = %id, user_id, "WebSocket connected");
        } else {
            tracing::debug!(client_id = %id, "Duplicate registration ignored");
        }
    }

    /// Remove a connection and close its outbound queue
    ///
    /// Returns false if the client was not registered, so calling it twice is
    /// harmless.
    pub async fn unregister(&self, id: &ClientId) -> bool {
        let removed = self.registry.lock().await.remove(id);

        match removed {
            Some(handle) => {
                self.stats.unregistered.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    client_id = %id,
                    user_id = handle.identity.user_id,
                    "WebSocket disconnected"
                );
                // Dropping the handle closes the queue and evicts the session
                drop(handle);
                true
            }
            None => false,
        }
    }

    /// Fan a payload out to every recipient chosen by the routing strategy
    ///
    /// Never fails: clients whose queue is full or closed are disconnected
    /// and reported in the returned [`BroadcastReport`].
    pub async fn broadcast(&self, origin: Option<&Identity>, payload: Payload) -> BroadcastReport {
        let _order = self.fanout.lock().await;

        let recipients = self.routing.route(origin, &payload);
        if recipients == Recipients::Nobody {
            tracing::trace!(routing = self.routing.name(), "Payload routed to nobody");
            self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
            return BroadcastReport::default();
        }

        let snapshot: Vec<(ClientId, i64, mpsc::Sender<Payload>)> = {
            let registry = self.registry.lock().await;
            registry
                .values()
                .map(|h| (h.id, h.identity.user_id, h.sender.clone()))
                .collect()
        };

        let mut report = BroadcastReport {
            snapshot: snapshot.len(),
            ..Default::default()
        };

        for (id, user_id, sender) in snapshot {
            if !recipients.includes(user_id) {
                report.skipped += 1;
                continue;
            }

            match sender.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(client_id = %id, user_id, "Slow consumer, disconnecting");
                    report.pruned.push((id, PruneReason::SlowConsumer));
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(client_id = %id, user_id, "Outbound queue closed");
                    report.pruned.push((id, PruneReason::Closed));
                }
            }
        }

        for (id, reason) in &report.pruned {
            if self.unregister(id).await {
                let counter = match reason {
                    PruneReason::SlowConsumer => &self.stats.pruned_slow,
                    PruneReason::Closed => &self.stats.pruned_closed,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);

        if report.delivered > 0 {
            tracing::trace!(
                routing = self.routing.name(),
                recipients = report.delivered,
                bytes = payload.len(),
                "Broadcast payload"
            );
        }

        report
    }

    /// Check whether a client is registered
    pub async fn contains(&self, id: &ClientId) -> bool {
        self.registry.lock().await.contains_key(id)
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Whether the hub has reached its connection limit
    pub async fn is_full(&self) -> bool {
        self.connection_count().await >= self.config.max_connections
    }

    /// List live connections
    pub async fn connected_clients(&self) -> Vec<ConnectedClient> {
        let registry = self.registry.lock().await;
        registry
            .values()
            .map(|h| ConnectedClient {
                id: h.id,
                user_id: h.identity.user_id,
                display_name: h.identity.display_name.clone(),
                connected_at: h.connected_at,
            })
            .collect()
    }

    pub fn stats(&self) -> HubStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for ConnectionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHub")
            .field("routing", &self.routing.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::client::Client;
    use crate::websocket::routing::{DirectRouting, RoomDirectory, RoomRouting, UnaddressedPolicy};

    fn identity(user_id: i64, name: &str) -> Identity {
        Identity {
            user_id,
            display_name: name.to_string(),
        }
    }

    fn small_hub(queue_capacity: usize) -> ConnectionHub {
        ConnectionHub::new(HubConfig {
            queue_capacity,
            ..Default::default()
        })
    }

    async fn connect(hub: &ConnectionHub, user_id: i64) -> Client {
        let (client, handle) = Client::new(identity(user_id, "user"), hub.config().queue_capacity);
        hub.register(handle).await;
        client
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.queue_capacity, 256);
        assert!(config.ping_interval.is_none());
        assert!(config.idle_timeout.is_none());
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = small_hub(8);
        let client = connect(&hub, 1).await;

        assert!(hub.contains(&client.id()).await);
        assert_eq!(hub.connection_count().await, 1);

        assert!(hub.unregister(&client.id()).await);
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_registry_size_tracks_operations() {
        let hub = small_hub(8);
        let mut clients = Vec::new();

        for user in 0..10 {
            clients.push(connect(&hub, user).await);
        }
        assert_eq!(hub.connection_count().await, 10);

        for client in clients.iter().take(4) {
            hub.unregister(&client.id()).await;
        }
        // Removing unknown or already-removed ids changes nothing
        hub.unregister(&clients[0].id()).await;
        hub.unregister(&Uuid::new_v4()).await;

        assert_eq!(hub.connection_count().await, 6);

        let stats = hub.stats();
        assert_eq!(stats.registered, 10);
        assert_eq!(stats.unregistered, 4);
    }

    #[tokio::test]
    async fn test_duplicate_register_ignored() {
        let hub = small_hub(8);
        let (client, handle) = Client::new(identity(1, "alice"), 8);
        let duplicate = ClientHandle::new(
            client.id(),
            identity(1, "alice"),
            mpsc::channel(1).0,
            oneshot::channel().0,
        );

        hub.register(handle).await;
        hub.register(duplicate).await;

        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.stats().registered, 1);
    }

    #[tokio::test]
    async fn test_double_unregister_is_noop() {
        let hub = small_hub(8);
        let mut client = connect(&hub, 1).await;

        assert!(hub.unregister(&client.id()).await);
        assert!(!hub.unregister(&client.id()).await);

        // Queue closed exactly once: receiver sees end of stream
        assert!(client.outbound_mut().recv().await.is_none());
        assert_eq!(hub.stats().unregistered, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let hub = small_hub(8);
        let mut clients = Vec::new();
        for user in 0..5 {
            clients.push(connect(&hub, user).await);
        }

        let report = hub.broadcast(None, Payload::text("hello")).await;
        assert_eq!(report.snapshot, 5);
        assert_eq!(report.delivered, 5);
        assert!(report.pruned.is_empty());

        for client in clients.iter_mut() {
            let payload = client.outbound_mut().try_recv().unwrap();
            assert_eq!(payload.as_bytes(), b"hello");
            assert!(client.outbound_mut().try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_unregistered_client_never_receives() {
        let hub = small_hub(8);
        let mut gone = connect(&hub, 1).await;
        let mut stays = connect(&hub, 2).await;

        hub.unregister(&gone.id()).await;
        let report = hub.broadcast(None, Payload::text("after")).await;

        assert_eq!(report.delivered, 1);
        assert!(gone.outbound_mut().recv().await.is_none());
        assert_eq!(stays.outbound_mut().try_recv().unwrap(), Payload::text("after"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_removal_during_broadcasts_stops_delivery() {
        use std::sync::atomic::AtomicUsize;

        let hub = Arc::new(small_hub(1024));
        let mut leaving = connect(&hub, 1).await;
        let mut staying = connect(&hub, 2).await;
        let completed = Arc::new(AtomicUsize::new(0));

        let broadcaster = {
            let hub = Arc::clone(&hub);
            let completed = Arc::clone(&completed);
            tokio::spawn(async move {
                for i in 0..500 {
                    hub.broadcast(None, Payload::text(i.to_string())).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        while completed.load(Ordering::SeqCst) < 20 {
            tokio::task::yield_now().await;
        }
        assert!(hub.unregister(&leaving.id()).await);
        // At most the one broadcast in flight when unregister returned can still land
        let limit = completed.load(Ordering::SeqCst) + 1;

        broadcaster.await.unwrap();

        let mut received = 0;
        while let Some(payload) = leaving.outbound_mut().recv().await {
            assert_eq!(payload, Payload::text(received.to_string()));
            received += 1;
        }
        assert!(received >= 20);
        assert!(received <= limit);

        for i in 0..500 {
            assert_eq!(
                staying.outbound_mut().try_recv().unwrap(),
                Payload::text(i.to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_slow_consumer_is_disconnected() {
        let hub = small_hub(2);
        let mut slow = connect(&hub, 1).await;
        let mut fast = connect(&hub, 2).await;

        // Saturate the slow client's queue while the fast one drains
        for i in 0..2 {
            hub.broadcast(None, Payload::text(format!("m{}", i))).await;
            fast.outbound_mut().try_recv().unwrap();
        }

        let report = hub.broadcast(None, Payload::text("overflow")).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec![(slow.id(), PruneReason::SlowConsumer)]);

        assert!(!hub.contains(&slow.id()).await);
        assert!(hub.contains(&fast.id()).await);
        assert_eq!(fast.outbound_mut().try_recv().unwrap(), Payload::text("overflow"));

        // The slow client keeps what was queued, never the overflow, then sees closure
        assert_eq!(slow.outbound_mut().recv().await, Some(Payload::text("m0")));
        assert_eq!(slow.outbound_mut().recv().await, Some(Payload::text("m1")));
        assert_eq!(slow.outbound_mut().recv().await, None);

        assert_eq!(hub.stats().pruned_slow, 1);
    }

    #[tokio::test]
    async fn test_closed_queue_is_pruned() {
        let hub = small_hub(8);
        let client = connect(&hub, 1).await;
        let id = client.id();
        drop(client);

        let report = hub.broadcast(None, Payload::text("x")).await;
        assert_eq!(report.pruned, vec![(id, PruneReason::Closed)]);
        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.stats().pruned_closed, 1);
    }

    #[tokio::test]
    async fn test_delivery_order_matches_broadcast_order() {
        let hub = Arc::new(small_hub(1024));
        let mut client = connect(&hub, 1).await;

        for i in 0..100 {
            hub.broadcast(None, Payload::text(i.to_string())).await;
        }

        for i in 0..100 {
            let payload = client.outbound_mut().try_recv().unwrap();
            assert_eq!(payload, Payload::text(i.to_string()));
        }
    }

    #[tokio::test]
    async fn test_concurrent_register_and_broadcast() {
        let hub = Arc::new(small_hub(1024));
        let mut tasks = Vec::new();

        for user in 0..32 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move {
                let client = connect(&hub, user).await;
                hub.broadcast(None, Payload::text("hi")).await;
                client
            }));
        }

        let mut clients = Vec::new();
        for task in tasks {
            clients.push(task.await.unwrap());
        }

        assert_eq!(hub.connection_count().await, 32);
        // Every client saw at least its own broadcast
        for client in clients.iter_mut() {
            assert!(client.outbound_mut().try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn test_direct_routing_scopes_delivery() {
        let hub = ConnectionHub::with_routing(
            HubConfig::default(),
            Arc::new(DirectRouting::new(UnaddressedPolicy::Drop)),
        );
        let mut alice = connect(&hub, 1).await;
        let mut bob = connect(&hub, 2).await;
        let mut carol = connect(&hub, 3).await;

        let report = hub
            .broadcast(Some(&identity(1, "alice")), Payload::text(r#"{"to": 2, "content": "psst"}"#))
            .await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.skipped, 1);
        assert!(alice.outbound_mut().try_recv().is_ok());
        assert!(bob.outbound_mut().try_recv().is_ok());
        assert!(carol.outbound_mut().try_recv().is_err());

        let report = hub
            .broadcast(Some(&identity(1, "alice")), Payload::text("no envelope"))
            .await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_room_routing_scopes_delivery() {
        let rooms = Arc::new(RoomDirectory::new());
        let hub = ConnectionHub::with_routing(
            HubConfig::default(),
            Arc::new(RoomRouting::new(Arc::clone(&rooms), UnaddressedPolicy::Drop)),
        );
        let mut alice = connect(&hub, 1).await;
        let mut bob = connect(&hub, 2).await;

        rooms.join("general", 1);
        rooms.join("general", 2);

        let message = || Payload::text(r#"{"room": "general", "content": "hey"}"#);

        hub.broadcast(Some(&identity(1, "alice")), message()).await;
        assert!(alice.outbound_mut().try_recv().is_ok());
        assert!(bob.outbound_mut().try_recv().is_ok());

        rooms.leave("general", 2);
        hub.broadcast(Some(&identity(1, "alice")), message()).await;
        assert!(alice.outbound_mut().try_recv().is_ok());
        assert!(bob.outbound_mut().try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let hub = ConnectionHub::new(HubConfig {
            max_connections: 2,
            ..Default::default()
        });

        let _a = connect(&hub, 1).await;
        assert!(!hub.is_full().await);
        let _b = connect(&hub, 2).await;
        assert!(hub.is_full().await);
    }

    #[tokio::test]
    async fn test_connected_clients_listing() {
        let hub = small_hub(8);
        let _client = connect(&hub, 7).await;

        let listing = hub.connected_clients().await;
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].user_id, 7);
    }
}
