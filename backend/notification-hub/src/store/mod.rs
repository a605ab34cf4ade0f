/// Durable, append-only record of notifications
///
/// Queried by recipient scope, newest first, bounded either by a
/// `(createdAt, id)` cursor or by a legacy page number.
use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Cursor, Notification, NotificationId, RecipientScope};

pub mod memory;
pub mod postgres;

pub use memory::MemoryNotificationStore;
pub use postgres::PgNotificationStore;

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub limit: u32,
    /// 1-based page number; ignored when `before` is set
    pub page: Option<u32>,
    /// Strict upper bound: only items older than this cursor
    pub before: Option<Cursor>,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(limit: Option<u32>) -> Self {
        Self {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            page: None,
            before: None,
        }
    }

    pub fn with_page(mut self, page: Option<u32>) -> Self {
        self.page = page.filter(|p| *p > 0);
        self
    }

    pub fn before(mut self, cursor: Option<Cursor>) -> Self {
        self.before = cursor;
        self
    }

    /// Row offset for page-based queries
    pub fn offset(&self) -> u32 {
        match (&self.before, self.page) {
            (None, Some(page)) => (page - 1).saturating_mul(self.limit),
            _ => 0,
        }
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(None)
    }
}

/// One page of results, newest first
#[derive(Debug, Clone)]
pub struct StorePage {
    pub items: Vec<Notification>,
    pub has_more: bool,
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn append(&self, notification: Notification) -> Result<Notification>;

    async fn get(&self, id: &NotificationId) -> Result<Option<Notification>>;

    async fn list(&self, scope: &RecipientScope, query: &ListQuery) -> Result<StorePage>;

    /// Idempotent. `false` when the id is unknown.
    async fn mark_read(&self, id: &NotificationId) -> Result<bool>;

    /// Number of ids that matched a stored notification
    async fn mark_read_many(&self, ids: &[NotificationId]) -> Result<u64>;
}
