//! REST collaborator used by a client session
//!
//! Listing accepts both the `{items, pagination}` envelope and a bare array.

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use resilience::with_timeout_result;

use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::models::{Cursor, Notification, NotificationId, RecipientScope};

/// One backfill request
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub limit: u32,
    /// Fetch strictly older than this; `None` for the newest page
    pub before: Option<Cursor>,
}

#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn fetch_page(
        &self,
        scope: &RecipientScope,
        request: &PageRequest,
    ) -> Result<Vec<Notification>, SyncError>;

    async fn confirm_read(&self, id: &NotificationId) -> Result<(), SyncError>;

    /// Defaults to one confirmation per id, stopping at the first failure.
    async fn confirm_read_many(&self, ids: &[NotificationId]) -> Result<(), SyncError> {
        for id in ids {
            self.confirm_read(id).await?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageResponse {
    Envelope { items: Vec<Notification> },
    Bare(Vec<Notification>),
}

impl PageResponse {
    fn into_items(self) -> Vec<Notification> {
        match self {
            PageResponse::Envelope { items } | PageResponse::Bare(items) => items,
        }
    }
}

/// Parse a listing body in either accepted shape
pub fn parse_page(body: &str) -> Result<Vec<Notification>, SyncError> {
    serde_json::from_str::<PageResponse>(body)
        .map(PageResponse::into_items)
        .map_err(|e| SyncError::FetchFailed(format!("unexpected listing body: {}", e)))
}

/// Query parameters selecting the scope's feed. Admin has none.
fn scope_params(scope: &RecipientScope) -> Vec<(&'static str, String)> {
    match scope {
        RecipientScope::Admin => Vec::new(),
        RecipientScope::Driver(id) => vec![("driverId", id.clone())],
        RecipientScope::Investor(id) => vec![("investorId", id.clone())],
        RecipientScope::Explicit { kind, id } => vec![
            ("recipientId", id.clone()),
            ("recipientKind", kind.clone()),
        ],
    }
}

pub struct HttpNotificationApi {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpNotificationApi {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.http_base_url, config.request_timeout)
    }

    async fn post_read(&self, url: String, body: Option<serde_json::Value>) -> Result<(), String> {
        let request = match body {
            Some(body) => self.client.post(&url).json(&body),
            None => self.client.post(&url),
        };
        let response = with_timeout_result(self.timeout, request.send())
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        // Only the status matters
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("status {}", response.status()))
        }
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn fetch_page(
        &self,
        scope: &RecipientScope,
        request: &PageRequest,
    ) -> Result<Vec<Notification>, SyncError> {
        let mut query: Vec<(&str, String)> = vec![("limit", request.limit.to_string())];
        query.extend(scope_params(scope));
        if let Some(cursor) = &request.before {
            query.push((
                "before",
                cursor.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ));
            query.push(("beforeId", cursor.id.to_string()));
        }

        let url = format!("{}/notifications", self.base_url);
        debug!(url = %url, scope = %scope, limit = request.limit, "Fetching notifications");

        let response = with_timeout_result(self.timeout, self.client.get(&url).query(&query).send())
            .await
            .map_err(|e| SyncError::FetchFailed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SyncError::FetchFailed(format!("status {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::FetchFailed(format!("read failed: {}", e)))?;
        parse_page(&body)
    }

    async fn confirm_read(&self, id: &NotificationId) -> Result<(), SyncError> {
        let url = format!("{}/notifications/{}/read", self.base_url, id);
        self.post_read(url, None)
            .await
            .map_err(|reason| SyncError::ConfirmReadFailed {
                id: id.clone(),
                reason,
            })
    }

    /// Uses the batch endpoint. A failure is reported against the first id.
    async fn confirm_read_many(&self, ids: &[NotificationId]) -> Result<(), SyncError> {
        let Some(first) = ids.first() else {
            return Ok(());
        };
        let url = format!("{}/notifications/read", self.base_url);
        self.post_read(url, Some(json!({ "ids": ids })))
            .await
            .map_err(|reason| SyncError::ConfirmReadFailed {
                id: first.clone(),
                reason: format!("batch of {}: {}", ids.len(), reason),
            })
    }
}
