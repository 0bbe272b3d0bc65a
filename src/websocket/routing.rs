//! Recipient Routing
//!
//! Decides, once per broadcast, which connected users a payload is meant for.
//! The hub stays a plain fan-out bus; everything that knows about direct
//! messages or rooms lives behind [`RoutingStrategy`].
//!
//! - [`FlatBroadcast`]: every connected client (global lobby)
//! - [`DirectRouting`]: `{"to": <user_id>, ...}` envelopes go to the addressee
//!   and the sender
//! - [`RoomRouting`]: `{"room": "<name>", ...}` envelopes go to room members

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::payload::Payload;
use crate::auth::Identity;

/// Which users should receive a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// Every registered client
    All,
    /// Only connections belonging to these user ids
    Users(HashSet<i64>),
    /// Nobody; the payload is discarded
    Nobody,
}

impl Recipients {
    /// Whether a connection owned by `user_id` is a recipient
    pub fn includes(&self, user_id: i64) -> bool {
        match self {
            Recipients::All => true,
            Recipients::Users(users) => users.contains(&user_id),
            Recipients::Nobody => false,
        }
    }
}

/// Strategy consulted by the hub for every broadcast
///
/// Implementations must be cheap and must not block: `route` runs on the
/// broadcasting task for every inbound frame.
pub trait RoutingStrategy: Send + Sync {
    /// Short name used in logs and the health endpoint
    fn name(&self) -> &'static str;

    /// Select recipients for `payload` sent by `origin` (`None` for
    /// server-originated payloads)
    fn route(&self, origin: Option<&Identity>, payload: &Payload) -> Recipients;
}

/// Routing mode selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    #[default]
    Broadcast,
    Direct,
    Room,
}

impl std::str::FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "broadcast" | "flat" => Ok(RoutingMode::Broadcast),
            "direct" | "dm" => Ok(RoutingMode::Direct),
            "room" | "rooms" => Ok(RoutingMode::Room),
            other => Err(format!("unknown routing mode: {}", other)),
        }
    }
}

/// Deliver everything to everyone
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatBroadcast;

impl RoutingStrategy for FlatBroadcast {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn route(&self, _origin: Option<&Identity>, _payload: &Payload) -> Recipients {
        Recipients::All
    }
}

/// What to do with a payload that carries no usable address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaddressedPolicy {
    #[default]
    Drop,
    Broadcast,
}

impl UnaddressedPolicy {
    fn recipients(self) -> Recipients {
        match self {
            UnaddressedPolicy::Drop => Recipients::Nobody,
            UnaddressedPolicy::Broadcast => Recipients::All,
        }
    }
}

/// Addressing fields understood by the scoped strategies; everything else in
/// the envelope is ignored
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    to: Option<i64>,
    #[serde(default)]
    room: Option<String>,
}

impl Envelope {
    fn parse(payload: &Payload) -> Option<Self> {
        serde_json::from_slice(payload.as_bytes()).ok()
    }
}

/// One-to-one delivery keyed on the envelope's `to` field
#[derive(Debug, Default, Clone)]
pub struct DirectRouting {
    unaddressed: UnaddressedPolicy,
}

impl DirectRouting {
    pub fn new(unaddressed: UnaddressedPolicy) -> Self {
        Self { unaddressed }
    }
}

impl RoutingStrategy for DirectRouting {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn route(&self, origin: Option<&Identity>, payload: &Payload) -> Recipients {
        let Some(to) = Envelope::parse(payload).and_then(|e| e.to) else {
            return self.unaddressed.recipients();
        };

        let mut users = HashSet::from([to]);
        // Echo to the sender's other sessions
        if let Some(origin) = origin {
            users.insert(origin.user_id);
        }
        Recipients::Users(users)
    }
}

/// In-memory room membership
///
/// Populated by whatever owns room management (join/leave endpoints); the hub
/// only reads it.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: RwLock<HashMap<String, HashSet<i64>>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a room. Returns false if already a member.
    pub fn join(&self, room: &str, user_id: i64) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let joined = rooms.entry(room.to_string()).or_default().insert(user_id);

        if joined {
            tracing::debug!(room = %room, user_id, "Joined room");
        }
        joined
    }

    /// Remove a user from a room. Returns false if not a member.
    pub fn leave(&self, room: &str, user_id: i64) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };

        let left = members.remove(&user_id);
        if members.is_empty() {
            rooms.remove(room);
        }
        if left {
            tracing::debug!(room = %room, user_id, "Left room");
        }
        left
    }

    /// Current members of a room
    pub fn members(&self, room: &str) -> HashSet<i64> {
        self.rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(room)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of non-empty rooms
    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Room-scoped delivery keyed on the envelope's `room` field
#[derive(Debug)]
pub struct RoomRouting {
    directory: std::sync::Arc<RoomDirectory>,
    unaddressed: UnaddressedPolicy,
}

impl RoomRouting {
    pub fn new(directory: std::sync::Arc<RoomDirectory>, unaddressed: UnaddressedPolicy) -> Self {
        Self {
            directory,
            unaddressed,
        }
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }
}

impl RoutingStrategy for RoomRouting {
    fn name(&self) -> &'static str {
        "room"
    }

    fn route(&self, _origin: Option<&Identity>, payload: &Payload) -> Recipients {
        match Envelope::parse(payload).and_then(|e| e.room) {
            Some(room) => {
                let members = self.directory.members(&room);
                if members.is_empty() {
                    Recipients::Nobody
                } else {
                    Recipients::Users(members)
                }
            }
            None => self.unaddressed.recipients(),
        }
    }
}
