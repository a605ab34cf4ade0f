//! Real-time transport seam
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::websocket::{ClientFrame, ServerEvent};

/// Where a transport reports what happens on the wire
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the connection
    ServerInitiated,
    /// `close()` was called
    ClientInitiated,
    /// Nothing heard from the server within the heartbeat timeout
    PingTimeout,
    TransportError(String),
}

impl DisconnectReason {
    /// Server drops are not retried by the transport; the caller reconnects.
    pub fn is_server_initiated(&self) -> bool {
        matches!(self, DisconnectReason::ServerInitiated)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ServerInitiated => f.write_str("server closed the connection"),
            DisconnectReason::ClientInitiated => f.write_str("client closed the connection"),
            DisconnectReason::PingTimeout => f.write_str("heartbeat timeout"),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection is up. `epoch` grows by one per successful connect.
    Connected { epoch: u64 },
    Disconnected(DisconnectReason),
    Message(ServerEvent),
    /// The retry budget is spent; nothing further will be attempted
    GaveUp,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and authenticate. Emits `Connected` on success.
    async fn open(&self, token: &str, sink: EventSink) -> Result<(), SyncError>;

    fn send(&self, frame: ClientFrame) -> Result<(), SyncError>;

    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_server_drops_are_server_initiated() {
        assert!(DisconnectReason::ServerInitiated.is_server_initiated());
        assert!(!DisconnectReason::PingTimeout.is_server_initiated());
        assert!(!DisconnectReason::TransportError("reset".into()).is_server_initiated());
        assert_eq!(DisconnectReason::PingTimeout.to_string(), "heartbeat timeout");
    }
}
