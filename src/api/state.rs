//! Application State
//!
//! Shared state accessible by all HTTP handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::auth::TokenValidator;
use crate::config::{ApiConfig, Config};
use crate::websocket::{
    ConnectionHub, DirectRouting, HubConfig, RoomDirectory, RoomRouting, RoutingMode,
    RoutingStrategy,
};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Connection hub for real-time chat
    pub hub: Arc<ConnectionHub>,
    /// Handshake token verification
    pub validator: Arc<TokenValidator>,
    /// Room membership (present in room routing mode)
    pub rooms: Option<Arc<RoomDirectory>>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state around an existing hub
    pub fn new(hub: Arc<ConnectionHub>, validator: TokenValidator, config: ApiConfig) -> Self {
        Self {
            hub,
            validator: Arc::new(validator),
            rooms: None,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Attach a room directory (room routing mode)
    pub fn with_rooms(mut self, rooms: Arc<RoomDirectory>) -> Self {
        self.rooms = Some(rooms);
        self
    }

    /// Build the hub, routing strategy and validator described by `config`
    pub fn from_config(config: &Config) -> Self {
        let hub_config: HubConfig = config.hub.to_hub_config();
        let unaddressed = config.hub.unaddressed;
        let validator = TokenValidator::with_leeway(&config.auth.jwt_secret, config.auth.leeway_secs);

        let (routing, rooms): (Option<Arc<dyn RoutingStrategy>>, Option<Arc<RoomDirectory>>) =
            match config.hub.routing {
                RoutingMode::Broadcast => (None, None),
                RoutingMode::Direct => (Some(Arc::new(DirectRouting::new(unaddressed))), None),
                RoutingMode::Room => {
                    let rooms = Arc::new(RoomDirectory::new());
                    let routing = Arc::new(RoomRouting::new(Arc::clone(&rooms), unaddressed));
                    (Some(routing), Some(rooms))
                }
            };

        let hub = match routing {
            Some(routing) => ConnectionHub::with_routing(hub_config, routing),
            None => ConnectionHub::new(hub_config),
        };

        let state = Self::new(Arc::new(hub), validator, config.api.clone());
        match rooms {
            Some(rooms) => state.with_rooms(rooms),
            None => state,
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn ws_connection_count(&self) -> usize {
        self.hub.connection_count().await
    }
}
