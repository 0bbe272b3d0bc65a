//! WebSocket Handler
//!
//! Authenticates the handshake and, only once the token checks out, upgrades
//! the connection and hands it to the hub.

use axum::{
    extract::{ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use super::client::Client;
use super::hub::ConnectionHub;
use crate::api::{ApiError, AppState};
use crate::auth::Identity;

/// Query string accepted on the handshake
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    /// Bearer token (JWT)
    pub token: Option<String>,
}

/// WebSocket upgrade handler
///
/// Rejects with 401 before any upgrade when the token is missing or invalid,
/// and with 503 when the hub is at its connection limit. A query string that
/// does not parse counts as a missing token.
pub async fn websocket_handler(
    ws: Option<WebSocketUpgrade>,
    query: Option<Query<HandshakeQuery>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let token = query.and_then(|Query(q)| q.token);
    let identity = state
        .validator
        .validate(token.as_deref())
        .map_err(|e| {
            tracing::warn!(error = %e, "WebSocket handshake rejected");
            ApiError::Unauthorized(e)
        })?;

    if state.hub.is_full().await {
        tracing::warn!(
            user_id = identity.user_id,
            limit = state.hub.config().max_connections,
            "WebSocket handshake refused, hub full"
        );
        return Err(ApiError::ServiceUnavailable(
            "too many connections".to_string(),
        ));
    }

    let ws = ws.ok_or_else(|| {
        ApiError::Validation("expected a WebSocket upgrade request".to_string())
    })?;

    let hub = Arc::clone(&state.hub);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, identity, hub)))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, hub: Arc<ConnectionHub>) {
    let (client, handle) = Client::new(identity, hub.config().queue_capacity);
    let id = client.id();

    hub.register(handle).await;
    client.run(socket, Arc::clone(&hub)).await;

    tracing::debug!(client_id = %id, "Connection closed");
}
