//! Per-project broadcast rooms.
//!
//! A room is the set of connections bound to one project id, sharing all
//! broadcast events over a single in-process channel. Delivery is
//! at-most-once: a member that disconnects or lags simply misses events,
//! and nothing is retried.

pub mod ws;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::api::store::Project;
use crate::auth::Identity;

/// Sender label for assistant replies.
pub const AI_SENDER: &str = "AI";

/// Buffered events per room before slow members start missing messages.
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Outbound `project-message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub user: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One broadcast within a room.
///
/// `origin` is the connection that produced the event; relays carry it so
/// each member can skip its own messages. Assistant replies have no origin
/// and reach every member, the sender included.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub origin: Option<Uuid>,
    pub payload: OutboundMessage,
}

impl RoomEvent {
    pub fn relay(origin: Uuid, user: &str, message: &str) -> Self {
        Self {
            origin: Some(origin),
            payload: OutboundMessage {
                user: user.to_string(),
                message: message.to_string(),
                timestamp: Utc::now(),
            },
        }
    }

    pub fn assistant(message: &str) -> Self {
        Self {
            origin: None,
            payload: OutboundMessage {
                user: AI_SENDER.to_string(),
                message: message.to_string(),
                timestamp: Utc::now(),
            },
        }
    }
}

/// An authenticated connection bound to exactly one room for its lifetime.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: Uuid,
    pub identity: Identity,
    pub project_id: Uuid,
    /// The project looked up at the handshake; absence is not fatal here,
    /// downstream consumers re-check.
    pub project: Option<Project>,
    pub room_id: String,
}

/// All live rooms, keyed by room id.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, broadcast::Sender<RoomEvent>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room, creating it lazily. Returns the send half for
    /// broadcasting and this member's receive half.
    pub fn join(
        &self,
        room_id: &str,
    ) -> (broadcast::Sender<RoomEvent>, broadcast::Receiver<RoomEvent>) {
        let tx = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .clone();
        let rx = tx.subscribe();
        (tx, rx)
    }

    /// Called after a member's receiver is dropped; empty rooms are
    /// removed so the registry doesn't grow forever.
    pub fn leave(&self, room_id: &str) {
        self.rooms
            .remove_if(room_id, |_, tx| tx.receiver_count() == 0);
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}
