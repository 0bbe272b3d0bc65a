//! # Chathub
//!
//! Live-connection hub for real-time chat: authenticates WebSocket handshakes,
//! keeps a registry of connected clients, and fans every inbound frame out to
//! its recipients concurrently.
//!
//! ## Features
//!
//! - **Authenticated handshakes**: HS256 JWT checked before any upgrade
//! - **Bounded fan-out**: per-client queues, slow consumers are disconnected
//! - **Single writer per socket**: one writer task owns each connection's sink
//! - **Pluggable routing**: flat broadcast, direct messages, or rooms
//! - **Optional hardening**: keepalive pings and idle timeouts
//!
//! ## Modules
//!
//! - [`websocket`]: Hub, client pumps, routing strategies
//! - [`auth`]: Handshake token verification
//! - [`api`]: HTTP surface with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chathub::websocket::{Client, ConnectionHub, HubConfig, Payload};
//! use chathub::auth::Identity;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = ConnectionHub::new(HubConfig::default());
//!
//!     let identity = Identity { user_id: 1, display_name: "alice".into() };
//!     let (client, handle) = Client::new(identity, 256);
//!     hub.register(handle).await;
//!
//!     let report = hub.broadcast(None, Payload::text("hello")).await;
//!     println!("Delivered to {} clients", report.delivered);
//!
//!     hub.unregister(&client.id()).await;
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod websocket;

pub use api::{build_router, serve, ApiError, AppState};

pub use auth::{AuthError, Claims, Identity, TokenValidator};

pub use config::{
    ApiConfig, AuthConfig, Config, ConfigError, ConfigSource, HubSettings, LoggingConfig,
};

pub use websocket::{
    websocket_handler, BroadcastReport, Client, ClientId, ConnectionHub, DirectRouting,
    FlatBroadcast, HubConfig, Payload, RoomDirectory, RoomRouting, RoutingMode, RoutingStrategy,
};
