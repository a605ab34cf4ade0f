//! Client side of the hub: what a consuming application runs per session.
//!
//! ```text
//! Transport ─► ConnectionManager ─┐
//! NotificationApi ─► Paginator ───┼─► NotificationSession (one dispatch loop)
//!                  ReadReconciler ┘        │
//!                                          ▼
//!                                  ClientCache ─► NotificationView (watch)
//! ```
pub mod api;
pub mod cache;
pub mod connection;
pub mod pagination;
pub mod reconciler;
pub mod session;
pub mod transport;
pub mod ws_transport;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{HttpNotificationApi, NotificationApi, PageRequest};
pub use cache::ClientCache;
pub use connection::{ConnectionManager, ConnectionStatus, ConnectionUpdate};
pub use pagination::Paginator;
pub use reconciler::{ConfirmOutcome, PendingConfirm, ReadReconciler};
pub use session::{Command, NotificationSession, NotificationView, SessionEvent, SessionHandle};
pub use transport::{DisconnectReason, EventSink, Transport, TransportEvent};
pub use ws_transport::WsTransport;
