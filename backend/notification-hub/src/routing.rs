/// Channel routing: recipient scope -> room key
///
/// Rooms are server-side routing artifacts only. They are recomputed at
/// subscribe time and never stored with a notification.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::Claims;
use crate::models::RecipientScope;

/// Fixed room every admin session joins
pub const ADMIN_ROOM: &str = "admin:all";

/// Room identifier, `"{kind}:{id}"`, case-sensitive
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Derive the room for a scope. Pure and stable, so join/leave pairs cancel.
pub fn room_for(scope: &RecipientScope) -> RoomKey {
    match scope.identity() {
        None => RoomKey(ADMIN_ROOM.to_string()),
        Some(id) => RoomKey(format!("{}:{}", scope.kind(), id)),
    }
}

/// Scope for an authenticated session, computed once at handshake.
pub fn scope_for_claims(claims: &Claims) -> RecipientScope {
    match claims.role.as_str() {
        RecipientScope::ADMIN => RecipientScope::Admin,
        RecipientScope::DRIVER => {
            RecipientScope::Driver(claims.driver_id.clone().unwrap_or_else(|| claims.sub.clone()))
        }
        RecipientScope::INVESTOR => RecipientScope::Investor(
            claims
                .investor_id
                .clone()
                .unwrap_or_else(|| claims.sub.clone()),
        ),
        other => RecipientScope::Explicit {
            kind: other.to_string(),
            id: claims.sub.clone(),
        },
    }
}

/// A session may join its own room; admins may join any room.
pub fn may_join(scope: &RecipientScope, room: &RoomKey) -> bool {
    matches!(scope, RecipientScope::Admin) || room_for(scope) == *room
}
