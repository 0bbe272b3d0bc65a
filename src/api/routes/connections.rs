//! Connection Routes
//!
//! - GET /api/v1/connections - List live WebSocket connections

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::ConnectionListResponse;
use crate::api::state::AppState;

/// GET /api/v1/connections
pub async fn list_connections(State(state): State<Arc<AppState>>) -> Json<ConnectionListResponse> {
    let connections = state.hub.connected_clients().await;

    Json(ConnectionListResponse {
        total: connections.len(),
        connections,
    })
}
