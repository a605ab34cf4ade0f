/// Room membership for live WebSocket connections
///
/// Maps room key -> connection id -> outbound sender. A connection may sit in
/// several rooms; joining a room twice is a no-op.
///
/// Publishing snapshots the subscriber set under the read lock and sends
/// outside of it, so a concurrent join/leave never observes a half-iterated
/// room. Senders whose connection has gone away are pruned afterwards.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::ServerEvent;
use crate::routing::RoomKey;

/// Outbound channel for one connection
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    /// Connections found dead during this publish
    pub dropped: usize,
}

#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<RoomKey, HashMap<ConnectionId, EventSender>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the connection was already in the room.
    pub async fn join(&self, room: RoomKey, connection: ConnectionId, sender: EventSender) -> bool {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.clone()).or_default();
        if members.contains_key(&connection) {
            return false;
        }
        members.insert(connection, sender);

        tracing::debug!(
            room = %room,
            connection = %connection,
            members = members.len(),
            "Connection joined room"
        );
        true
    }

    /// Returns `false` when the connection was not in the room.
    pub async fn leave(&self, room: &RoomKey, connection: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&connection).is_some();
        if members.is_empty() {
            rooms.remove(room);
        }
        if removed {
            tracing::debug!(room = %room, connection = %connection, "Connection left room");
        }
        removed
    }

    /// Remove a connection from every room it joined. Called when the
    /// connection closes, whatever the reason.
    pub async fn leave_all(&self, connection: ConnectionId) -> Vec<RoomKey> {
        let mut rooms = self.rooms.write().await;
        let mut left = Vec::new();
        rooms.retain(|room, members| {
            if members.remove(&connection).is_some() {
                left.push(room.clone());
            }
            !members.is_empty()
        });
        left
    }

    /// Send `event` to every connection currently in `room`.
    pub async fn publish(&self, room: &RoomKey, event: ServerEvent) -> PublishOutcome {
        let snapshot: Vec<(ConnectionId, EventSender)> = {
            let rooms = self.rooms.read().await;
            match rooms.get(room) {
                Some(members) => members
                    .iter()
                    .map(|(id, sender)| (*id, sender.clone()))
                    .collect(),
                None => return PublishOutcome::default(),
            }
        };

        let mut outcome = PublishOutcome::default();
        let mut dead = Vec::new();
        for (id, sender) in snapshot {
            // A closed receiver means the session is gone; swallow and prune
            match sender.send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(_) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            outcome.dropped = dead.len();
            let mut rooms = self.rooms.write().await;
            if let Some(members) = rooms.get_mut(room) {
                for id in &dead {
                    members.remove(id);
                }
                if members.is_empty() {
                    rooms.remove(room);
                }
            }
            tracing::debug!(
                room = %room,
                dropped = dead.len(),
                "Pruned dead connections during publish"
            );
        }

        outcome
    }

    pub async fn room_size(&self, room: &RoomKey) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Distinct connections across all rooms
    pub async fn total_connections(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms
            .values()
            .flat_map(|members| members.keys())
            .collect::<HashSet<_>>()
            .len()
    }

    pub async fn rooms_for(&self, connection: ConnectionId) -> Vec<RoomKey> {
        let rooms = self.rooms.read().await;
        let mut joined: Vec<RoomKey> = rooms
            .iter()
            .filter(|(_, members)| members.contains_key(&connection))
            .map(|(room, _)| room.clone())
            .collect();
        joined.sort();
        joined
    }
}
