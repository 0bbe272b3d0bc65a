//! WebSocket Real-Time Chat
//!
//! Live-connection hub backing real-time chat.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Registry of live clients and broadcast fan-out
//! - **Client**: Per-connection reader/writer pump pair
//! - **Routing**: Pluggable recipient selection (flat, direct, room)
//! - **Handler**: Authenticated WebSocket upgrade
//!
//! ## Usage
//!
//! Clients connect to `/ws?token=<jwt>`. Every text or binary frame a client
//! sends is handed to the hub, which enqueues it for each recipient chosen by
//! the routing strategy. Payloads are opaque to the hub.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket(`ws://localhost:8080/ws?token=${jwt}`);
//!
//! ws.onopen = () => ws.send('hello');
//! ws.onmessage = (event) => console.log('Received:', event.data);
//! ```

mod client;
mod handler;
mod hub;
mod payload;
mod routing;

pub use client::{read_pump, write_pump, Client, ReadExit, WriteExit};
pub use handler::{websocket_handler, HandshakeQuery};
pub use hub::{
    BroadcastReport, ClientHandle, ClientId, ConnectedClient, ConnectionHub, HubConfig,
    HubStatsSnapshot, PruneReason,
};
pub use payload::Payload;
pub use routing::{
    DirectRouting, FlatBroadcast, Recipients, RoomDirectory, RoomRouting, RoutingMode,
    RoutingStrategy, UnaddressedPolicy,
};
