/// Real-time channel frames
use serde::{Deserialize, Serialize};

use crate::models::Notification;
use crate::routing::RoomKey;

/// client -> server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { room: RoomKey },
    Leave { room: RoomKey },
}

/// server -> client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Handshake accepted
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        connection_id: String,
        timestamp: i64,
    },

    #[serde(rename = "joined")]
    Joined { room: RoomKey },

    #[serde(rename = "left")]
    Left { room: RoomKey },

    #[serde(rename = "notification.created")]
    NotificationCreated(Notification),

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ServerEvent {
    pub fn connected(connection_id: impl ToString) -> Self {
        ServerEvent::Connected {
            connection_id: connection_id.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationId, RecipientScope};
    use serde_json::json;

    #[test]
    fn test_client_frames() {
        let join = ClientFrame::Join {
            room: "driver:42".into(),
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({"type": "join", "room": "driver:42"})
        );

        let leave = ClientFrame::from_json(r#"{"type":"leave","room":"admin:all"}"#).unwrap();
        assert_eq!(
            leave,
            ClientFrame::Leave {
                room: "admin:all".into()
            }
        );
    }

    #[test]
    fn test_notification_created_is_flat() {
        let event = ServerEvent::NotificationCreated(Notification {
            id: NotificationId::from("n1"),
            recipient_scope: RecipientScope::Investor("7".into()),
            title: "Payout".into(),
            message: "Monthly payout sent".into(),
            created_at: "2024-05-01T10:00:00Z".parse().unwrap(),
            read: false,
            payload: Some(json!({"amount": 1200})),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "notification.created");
        assert_eq!(value["id"], "n1");
        assert_eq!(value["recipientScope"]["kind"], "investor");

        let back = ServerEvent::from_json(&value.to_string()).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_connected_uses_camel_case() {
        let json = ServerEvent::connected("abc").to_json().unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"connectionId\":\"abc\""));
    }

    #[test]
    fn test_unknown_frame_rejected() {
        assert!(ClientFrame::from_json(r#"{"type":"subscribe","room":"x"}"#).is_err());
    }
}
