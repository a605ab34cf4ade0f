use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{error, info};

use super::{ListQuery, NotificationStore, StorePage};
use crate::error::{AppError, Result};
use crate::models::{Notification, NotificationId, RecipientScope};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const COLUMNS: &str =
    "id, scope_kind, scope_id, title, message, created_at, is_read, payload";

/// Listing query for one scope, newest first.
///
/// Ids compare under the "C" collation so ties on `created_at` break by byte
/// order, the same order `Cursor` uses.
fn list_sql(with_cursor: bool) -> String {
    let (boundary, limit) = if with_cursor {
        (r#"AND (created_at, id COLLATE "C") < ($3, $4)"#, "LIMIT $5")
    } else {
        ("", "LIMIT $3 OFFSET $4")
    };
    format!(
        r#"
        SELECT {COLUMNS} FROM notifications
        WHERE scope_kind = $1 AND scope_id IS NOT DISTINCT FROM $2
          {boundary}
        ORDER BY created_at DESC, id COLLATE "C" DESC
        {limit}
        "#
    )
}

/// Notification store backed by PostgreSQL.
///
/// One row per notification; the recipient scope is kept as a
/// `(scope_kind, scope_id)` pair so listings can use the
/// `(scope_kind, scope_id, created_at DESC, id COLLATE "C" DESC)` index.
#[derive(Clone)]
pub struct PgNotificationStore {
    db: PgPool,
}

impl PgNotificationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        MIGRATOR
            .run(&db)
            .await
            .map_err(|e| AppError::Database(format!("migration failed: {}", e)))?;
        info!("Connected to notification database");
        Ok(Self::new(db))
    }

    fn from_row(row: &PgRow) -> Result<Notification> {
        let kind: String = row.try_get("scope_kind")?;
        let scope_id: Option<String> = row.try_get("scope_id")?;
        let recipient_scope = match scope_id {
            Some(id) => RecipientScope::explicit(kind, id),
            None if kind == RecipientScope::ADMIN => RecipientScope::Admin,
            None => {
                return Err(AppError::Database(format!(
                    "scope '{}' stored without identity",
                    kind
                )))
            }
        };

        Ok(Notification {
            id: NotificationId::new(row.try_get::<String, _>("id")?),
            recipient_scope,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            created_at: row.try_get("created_at")?,
            read: row.try_get("is_read")?,
            payload: row.try_get("payload")?,
        })
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn append(&self, notification: Notification) -> Result<Notification> {
        let query = format!(
            r#"
            INSERT INTO notifications (
                id, scope_kind, scope_id, title, message, created_at, is_read, payload
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(notification.id.as_str())
            .bind(notification.recipient_scope.kind())
            .bind(notification.recipient_scope.identity())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.created_at)
            .bind(notification.read)
            .bind(&notification.payload)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                error!("Failed to append notification: {}", e);
                AppError::from(e)
            })?;

        // RETURNING gives back the column precision actually stored
        Self::from_row(&row)
    }

    async fn get(&self, id: &NotificationId) -> Result<Option<Notification>> {
        let query = format!("SELECT {COLUMNS} FROM notifications WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list(&self, scope: &RecipientScope, query: &ListQuery) -> Result<StorePage> {
        let fetch = i64::from(query.limit) + 1;

        let rows = match &query.before {
            Some(cursor) => {
                let sql = list_sql(true);
                sqlx::query(&sql)
                    .bind(scope.kind())
                    .bind(scope.identity())
                    .bind(cursor.created_at)
                    .bind(cursor.id.as_str())
                    .bind(fetch)
                    .fetch_all(&self.db)
                    .await?
            }
            None => {
                let sql = list_sql(false);
                sqlx::query(&sql)
                    .bind(scope.kind())
                    .bind(scope.identity())
                    .bind(fetch)
                    .bind(i64::from(query.offset()))
                    .fetch_all(&self.db)
                    .await?
            }
        };

        let mut items = rows
            .iter()
            .map(Self::from_row)
            .collect::<Result<Vec<_>>>()?;
        let has_more = items.len() > query.limit as usize;
        items.truncate(query.limit as usize);

        Ok(StorePage { items, has_more })
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = true WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_read_many(&self, ids: &[NotificationId]) -> Result<u64> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let result = sqlx::query("UPDATE notifications SET is_read = true WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
