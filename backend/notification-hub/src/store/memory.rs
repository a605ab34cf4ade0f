use async_trait::async_trait;
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ListQuery, NotificationStore, StorePage};
use crate::error::Result;
use crate::models::{Notification, NotificationId, RecipientScope};

/// Process-local store, used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct MemoryNotificationStore {
    records: Arc<RwLock<Vec<Notification>>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn append(&self, notification: Notification) -> Result<Notification> {
        self.records.write().await.push(notification.clone());
        debug!(id = %notification.id, scope = %notification.recipient_scope, "Appended notification");
        Ok(notification)
    }

    async fn get(&self, id: &NotificationId) -> Result<Option<Notification>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|n| &n.id == id).cloned())
    }

    async fn list(&self, scope: &RecipientScope, query: &ListQuery) -> Result<StorePage> {
        let records = self.records.read().await;

        let mut matching: Vec<&Notification> = records
            .iter()
            .filter(|n| &n.recipient_scope == scope)
            .filter(|n| match &query.before {
                Some(cursor) => n.cursor() < *cursor,
                None => true,
            })
            .collect();
        matching.sort_by_key(|n| Reverse(n.cursor()));

        let limit = query.limit as usize;
        let mut items: Vec<Notification> = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(limit + 1)
            .cloned()
            .collect();

        let has_more = items.len() > limit;
        items.truncate(limit);

        Ok(StorePage { items, has_more })
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|n| &n.id == id) {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_read_many(&self, ids: &[NotificationId]) -> Result<u64> {
        let mut records = self.records.write().await;
        let mut matched = 0;
        for n in records.iter_mut().filter(|n| ids.contains(&n.id)) {
            n.read = true;
            matched += 1;
        }
        Ok(matched)
    }
}
