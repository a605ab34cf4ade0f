//! Connection lifecycle for one client session
//!
//! Owns the transport, joins the session's room once per connection epoch,
//! reconnects after server-initiated drops and releases the room on teardown.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use resilience::{retry_with_backoff, BackoffConfig};

use super::transport::{DisconnectReason, EventSink, Transport, TransportEvent};
use crate::error::SyncError;
use crate::models::RecipientScope;
use crate::routing::{room_for, RoomKey};
use crate::websocket::ClientFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Online,
    Reconnecting,
    /// Retry budget spent; only an explicit retry reconnects
    Offline,
    Closed,
}

/// What a transport event changed
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionUpdate {
    Unchanged,
    /// The room join went out for a new epoch
    Joined { rejoin: bool },
    Error(SyncError),
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    sink: EventSink,
    token: String,
    room: RoomKey,
    reconnect: BackoffConfig,
    status: ConnectionStatus,
    joined_epoch: Option<u64>,
    connect_task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: EventSink,
        token: impl Into<String>,
        scope: &RecipientScope,
        reconnect: BackoffConfig,
    ) -> Self {
        Self {
            transport,
            sink,
            token: token.into(),
            room: room_for(scope),
            reconnect,
            status: ConnectionStatus::Idle,
            joined_epoch: None,
            connect_task: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    pub fn connect(&mut self) {
        if self.status == ConnectionStatus::Idle {
            self.status = ConnectionStatus::Connecting;
            self.spawn_connect();
        }
    }

    /// Reconnect after the retry budget ran out. Returns `false` when not offline.
    pub fn retry(&mut self) -> bool {
        if self.status != ConnectionStatus::Offline {
            return false;
        }
        info!(room = %self.room, "Retrying connection");
        self.status = ConnectionStatus::Connecting;
        self.spawn_connect();
        true
    }

    pub fn handle(&mut self, event: &TransportEvent) -> ConnectionUpdate {
        if self.status == ConnectionStatus::Closed {
            return ConnectionUpdate::Unchanged;
        }

        match event {
            TransportEvent::Connected { epoch } => {
                self.status = ConnectionStatus::Online;
                self.join(*epoch)
            }
            TransportEvent::Disconnected(DisconnectReason::ClientInitiated) => {
                ConnectionUpdate::Unchanged
            }
            TransportEvent::Disconnected(reason) => {
                warn!(room = %self.room, reason = %reason, "Connection lost");
                self.status = ConnectionStatus::Reconnecting;
                if reason.is_server_initiated() {
                    self.spawn_connect();
                }
                ConnectionUpdate::Error(SyncError::ConnectionError(reason.to_string()))
            }
            TransportEvent::GaveUp => {
                warn!(room = %self.room, "Giving up on reconnection");
                self.status = ConnectionStatus::Offline;
                ConnectionUpdate::Error(SyncError::ReconnectExhausted {
                    attempts: self.reconnect.max_attempts,
                })
            }
            TransportEvent::Message(_) => ConnectionUpdate::Unchanged,
        }
    }

    /// Leave the room and close the transport. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.status == ConnectionStatus::Closed {
            return;
        }
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        if self.joined_epoch.is_some() {
            let leave = ClientFrame::Leave {
                room: self.room.clone(),
            };
            if let Err(e) = self.transport.send(leave) {
                debug!(error = %e, "Leave not sent");
            }
        }
        self.transport.close();
        self.status = ConnectionStatus::Closed;
        info!(room = %self.room, "Connection torn down");
    }

    fn join(&mut self, epoch: u64) -> ConnectionUpdate {
        if self.joined_epoch == Some(epoch) {
            return ConnectionUpdate::Unchanged;
        }
        let rejoin = self.joined_epoch.is_some();
        let frame = ClientFrame::Join {
            room: self.room.clone(),
        };
        match self.transport.send(frame) {
            Ok(()) => {
                self.joined_epoch = Some(epoch);
                debug!(room = %self.room, epoch, rejoin, "Joined room");
                ConnectionUpdate::Joined { rejoin }
            }
            Err(e) => ConnectionUpdate::Error(e),
        }
    }

    fn spawn_connect(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }

        let transport = Arc::clone(&self.transport);
        let sink = self.sink.clone();
        let token = self.token.clone();
        let config = self.reconnect.clone();

        self.connect_task = Some(tokio::spawn(async move {
            let result = retry_with_backoff(&config, |_| {
                let transport = Arc::clone(&transport);
                let sink = sink.clone();
                let token = token.clone();
                async move { transport.open(&token, sink).await }
            })
            .await;

            if let Err(e) = result {
                warn!(attempts = e.attempts(), error = %e, "Could not connect");
                let _ = sink.send(TransportEvent::GaveUp);
            }
        }));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
