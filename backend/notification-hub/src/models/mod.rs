use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque notification identifier.
///
/// The hub mints UUID v4 strings, but ids coming back from legacy backends are
/// accepted as-is. Stable across push and fetch paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Who a notification is addressed to.
///
/// Decides room membership only, never ownership of the notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ScopeWire", into = "ScopeWire")]
pub enum RecipientScope {
    /// Role-based broadcast to every admin session
    Admin,
    Driver(String),
    Investor(String),
    Explicit { kind: String, id: String },
}

impl RecipientScope {
    pub const ADMIN: &'static str = "admin";
    pub const DRIVER: &'static str = "driver";
    pub const INVESTOR: &'static str = "investor";

    /// Build a scope from a kind/identity pair, folding the well-known kinds
    /// into their dedicated variants.
    pub fn explicit(kind: impl Into<String>, id: impl Into<String>) -> Self {
        let kind = kind.into();
        let id = id.into();
        match kind.as_str() {
            Self::ADMIN => RecipientScope::Admin,
            Self::DRIVER => RecipientScope::Driver(id),
            Self::INVESTOR => RecipientScope::Investor(id),
            _ => RecipientScope::Explicit { kind, id },
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            RecipientScope::Admin => Self::ADMIN,
            RecipientScope::Driver(_) => Self::DRIVER,
            RecipientScope::Investor(_) => Self::INVESTOR,
            RecipientScope::Explicit { kind, .. } => kind,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            RecipientScope::Admin => None,
            RecipientScope::Driver(id) | RecipientScope::Investor(id) => Some(id),
            RecipientScope::Explicit { id, .. } => Some(id),
        }
    }
}

impl fmt::Display for RecipientScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity() {
            Some(id) => write!(f, "{}({})", self.kind(), id),
            None => f.write_str(self.kind()),
        }
    }
}

/// Wire shape: `{"kind": "driver", "identity": "42"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScopeWire {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity: Option<String>,
}

impl TryFrom<ScopeWire> for RecipientScope {
    type Error = String;

    fn try_from(wire: ScopeWire) -> Result<Self, Self::Error> {
        if wire.kind.is_empty() {
            return Err("recipient scope kind must not be empty".to_string());
        }
        if wire.kind == Self::ADMIN {
            return Ok(RecipientScope::Admin);
        }
        match wire.identity {
            Some(id) if !id.is_empty() => Ok(RecipientScope::explicit(wire.kind, id)),
            _ => Err(format!("recipient scope '{}' requires an identity", wire.kind)),
        }
    }
}

impl From<RecipientScope> for ScopeWire {
    fn from(scope: RecipientScope) -> Self {
        ScopeWire {
            kind: scope.kind().to_string(),
            identity: scope.identity().map(str::to_string),
        }
    }
}

/// Core notification model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,

    pub recipient_scope: RecipientScope,

    pub title: String,

    pub message: String,

    /// Sole ordering key
    pub created_at: DateTime<Utc>,

    #[serde(default, alias = "isRead")]
    pub read: bool,

    /// Opaque data for the consumer (deep links, entity ids, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Notification {
    /// Mint a fresh, unread notification stamped with the current time
    pub fn new(request: CreateNotificationRequest) -> Self {
        Self {
            id: NotificationId::generate(),
            recipient_scope: request.recipient_scope,
            title: request.title,
            message: request.message,
            created_at: Utc::now(),
            read: false,
            payload: request.payload,
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }
}

/// Pagination boundary: the `(createdAt, id)` of the oldest item seen so far.
///
/// Ordering is by `created_at`, ties broken by `id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: NotificationId,
}

/// Request to create a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    pub recipient_scope: RecipientScope,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Paginated listing returned by `GET /notifications`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    #[serde(default)]
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}
