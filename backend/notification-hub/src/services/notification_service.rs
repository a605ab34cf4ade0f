/// Notification Service Core
///
/// 1. Validates and stores notifications (append-only)
/// 2. Hands every stored notification to the fan-out without waiting on it
/// 3. Serves scoped, cursor- or page-bounded listings
/// 4. Records read confirmations, single or batched
use std::sync::Arc;
use tracing::{info, warn};

use super::FanoutPublisher;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    CreateNotificationRequest, Notification, NotificationId, NotificationPage, PageInfo,
    RecipientScope,
};
use crate::store::{ListQuery, NotificationStore};

pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    fanout: FanoutPublisher,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>, fanout: FanoutPublisher) -> Self {
        Self { store, fanout }
    }

    pub fn fanout(&self) -> &FanoutPublisher {
        &self.fanout
    }

    /// Store a notification and publish it to its room.
    ///
    /// Fan-out failures never fail creation.
    pub async fn create_notification(&self, req: CreateNotificationRequest) -> Result<Notification> {
        if req.title.trim().is_empty() {
            return Err(AppError::BadRequest("title must not be empty".to_string()));
        }

        let stored = self.store.append(Notification::new(req)).await?;
        metrics::notification_created();
        info!(
            id = %stored.id,
            scope = %stored.recipient_scope,
            "Created notification"
        );

        self.fanout.publish(stored.clone());
        Ok(stored)
    }

    pub async fn get_notification(&self, id: &NotificationId) -> Result<Notification> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(id.clone()))
    }

    pub async fn list_notifications(
        &self,
        scope: &RecipientScope,
        query: &ListQuery,
    ) -> Result<NotificationPage> {
        let page = self.store.list(scope, query).await?;
        let next_cursor = if page.has_more {
            page.items.last().map(Notification::cursor)
        } else {
            None
        };

        Ok(NotificationPage {
            pagination: PageInfo {
                limit: query.limit,
                page: if query.before.is_none() { query.page } else { None },
                has_more: page.has_more,
                next_cursor,
            },
            items: page.items,
        })
    }

    pub async fn mark_as_read(&self, id: &NotificationId) -> Result<()> {
        if self.store.mark_read(id).await? {
            Ok(())
        } else {
            warn!(id = %id, "Read confirmation for unknown notification");
            Err(AppError::NotFound(id.clone()))
        }
    }

    pub async fn mark_many_as_read(&self, ids: &[NotificationId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let matched = self.store.mark_read_many(ids).await?;
        info!(requested = ids.len(), matched, "Batch read confirmation");
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryNotificationStore;
    use crate::websocket::{ConnectionId, RoomRegistry, ServerEvent};
    use tokio::sync::mpsc;

    fn service() -> (NotificationService, RoomRegistry) {
        let registry = RoomRegistry::new();
        let service = NotificationService::new(
            Arc::new(MemoryNotificationStore::new()),
            FanoutPublisher::new(registry.clone()),
        );
        (service, registry)
    }

    fn request(scope: RecipientScope, title: &str) -> CreateNotificationRequest {
        CreateNotificationRequest {
            recipient_scope: scope,
            title: title.to_string(),
            message: "details".to_string(),
            payload: None,
        }
    }

    #[tokio::test]
    async fn test_create_publishes_to_room() {
        let (service, registry) = service();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.join("driver:42".into(), ConnectionId::new(), tx).await;

        let created = service
            .create_notification(request(RecipientScope::Driver("42".into()), "Route changed"))
            .await
            .unwrap();
        assert!(!created.read);

        match rx.recv().await {
            Some(ServerEvent::NotificationCreated(pushed)) => assert_eq!(pushed.id, created.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_without_subscribers_succeeds() {
        let (service, _registry) = service();
        let created = service
            .create_notification(request(RecipientScope::Admin, "Nightly report"))
            .await;
        tokio_test::assert_ok!(created);
    }

    #[tokio::test]
    async fn test_empty_title_rejected() {
        let (service, _) = service();
        let err = service
            .create_notification(request(RecipientScope::Admin, "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_list_sets_next_cursor_when_more() {
        let (service, _) = service();
        let scope = RecipientScope::Investor("7".into());
        for i in 0..3 {
            service
                .create_notification(request(scope.clone(), &format!("n{}", i)))
                .await
                .unwrap();
        }

        let page = service
            .list_notifications(&scope, &ListQuery::new(Some(2)))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.pagination.has_more);
        assert_eq!(
            page.pagination.next_cursor,
            page.items.last().map(Notification::cursor)
        );

        let rest = service
            .list_notifications(
                &scope,
                &ListQuery::new(Some(2)).before(page.pagination.next_cursor.clone()),
            )
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert!(!rest.pagination.has_more);
        assert!(rest.pagination.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_mark_as_read() {
        let (service, _) = service();
        let created = service
            .create_notification(request(RecipientScope::Admin, "Audit"))
            .await
            .unwrap();

        tokio_test::assert_ok!(service.mark_as_read(&created.id).await);
        tokio_test::assert_ok!(service.mark_as_read(&created.id).await);
        assert!(service.get_notification(&created.id).await.unwrap().read);

        let err = service.mark_as_read(&"missing".into()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        assert_eq!(service.mark_many_as_read(&[]).await.unwrap(), 0);
    }
}
