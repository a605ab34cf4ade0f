/// Delivery fan-out: push a freshly created notification to its room
///
/// Delivery is at-least-once from the consumer's point of view; clients
/// dedup by notification id.
use tokio::task::JoinHandle;
use tracing::debug;

use crate::metrics;
use crate::models::Notification;
use crate::routing::room_for;
use crate::websocket::{PublishOutcome, RoomRegistry, ServerEvent};

#[derive(Clone)]
pub struct FanoutPublisher {
    registry: RoomRegistry,
}

impl FanoutPublisher {
    pub fn new(registry: RoomRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Dispatch in the background; the caller never waits on slow or dead
    /// connections.
    pub fn publish(&self, notification: Notification) -> JoinHandle<PublishOutcome> {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let room = room_for(&notification.recipient_scope);
            let id = notification.id.clone();
            let outcome = registry
                .publish(&room, ServerEvent::NotificationCreated(notification))
                .await;

            metrics::record_fanout(outcome.delivered, outcome.dropped);
            debug!(
                notification = %id,
                room = %room,
                delivered = outcome.delivered,
                dropped = outcome.dropped,
                "Fan-out complete"
            );
            outcome
        })
    }
}
