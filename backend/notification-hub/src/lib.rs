//! Real-time notification hub.
//!
//! Server half: REST listing/read confirmation, WebSocket rooms and fan-out.
//! Client half (`client`): cache, read-state reconciliation, pagination and
//! connection lifecycle for a session consuming the hub.
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod routing;
pub mod services;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::{ClientConfig, Config};
pub use error::{AppError, Result, SyncError};
pub use services::{FanoutPublisher, NotificationService};
pub use state::AppState;
