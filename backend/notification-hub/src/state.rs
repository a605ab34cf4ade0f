use std::sync::Arc;

use crate::config::Config;
use crate::services::{FanoutPublisher, NotificationService};
use crate::store::NotificationStore;
use crate::websocket::RoomRegistry;

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NotificationService>,
    pub registry: RoomRegistry,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn NotificationStore>, config: Config) -> Self {
        let registry = RoomRegistry::new();
        let service = NotificationService::new(store, FanoutPublisher::new(registry.clone()));
        Self {
            service: Arc::new(service),
            registry,
            config: Arc::new(config),
        }
    }
}
