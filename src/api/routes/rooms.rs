//! Room Membership Routes
//!
//! Keeps the in-memory room directory used by room routing in step with the
//! caller's membership. Only mounted meaningfully in room routing mode; in
//! any other mode these return 404.
//!
//! - POST /api/v1/rooms/:room/join - Join a room as the bearer
//! - POST /api/v1/rooms/:room/leave - Leave a room as the bearer

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use std::sync::Arc;

use crate::api::dto::MembershipResponse;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::auth::Identity;
use crate::websocket::RoomDirectory;

/// POST /api/v1/rooms/:room/join
pub async fn join_room(
    Path(room): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MembershipResponse>> {
    let identity = bearer_identity(&state, &headers)?;
    let rooms = room_directory(&state)?;
    let room = validate_room(room)?;

    let changed = rooms.join(&room, identity.user_id);
    tracing::info!(room = %room, user_id = identity.user_id, changed, "Room join");

    Ok(Json(MembershipResponse {
        members: rooms.members(&room).len(),
        room,
        user_id: identity.user_id,
        changed,
    }))
}

/// POST /api/v1/rooms/:room/leave
pub async fn leave_room(
    Path(room): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MembershipResponse>> {
    let identity = bearer_identity(&state, &headers)?;
    let rooms = room_directory(&state)?;
    let room = validate_room(room)?;

    let changed = rooms.leave(&room, identity.user_id);
    tracing::info!(room = %room, user_id = identity.user_id, changed, "Room leave");

    Ok(Json(MembershipResponse {
        members: rooms.members(&room).len(),
        room,
        user_id: identity.user_id,
        changed,
    }))
}

fn bearer_identity(state: &AppState, headers: &HeaderMap) -> ApiResult<Identity> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    Ok(state.validator.validate(token)?)
}

fn room_directory(state: &AppState) -> ApiResult<&RoomDirectory> {
    state
        .rooms
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("room routing is not enabled".to_string()))
}

fn validate_room(room: String) -> ApiResult<String> {
    let room = room.trim().to_string();
    if room.is_empty() || room.len() > 128 {
        return Err(ApiError::Validation(
            "room name must be 1-128 characters".to_string(),
        ));
    }
    Ok(room)
}
