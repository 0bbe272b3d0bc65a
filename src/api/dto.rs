//! Data Transfer Objects
//!
//! Response types for the HTTP endpoints.

use serde::Serialize;

use crate::websocket::{ConnectedClient, HubStatsSnapshot};

/// Full health status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, saturated
    pub status: String,
    /// Live WebSocket connections
    pub connections: usize,
    /// Connection limit
    pub max_connections: usize,
    /// Active routing strategy
    pub routing: String,
    /// Hub counters
    pub hub: HubStatsSnapshot,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}

/// Live connection listing
#[derive(Debug, Serialize)]
pub struct ConnectionListResponse {
    pub total: usize,
    pub connections: Vec<ConnectedClient>,
}

/// Room membership change result
#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub room: String,
    pub user_id: i64,
    /// False when the request did not change membership
    pub changed: bool,
    pub members: usize,
}
