use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::models::NotificationId;

pub type Result<T> = std::result::Result<T, AppError>;

/// Server-side errors
#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("notification not found: {0}")]
    NotFound(NotificationId),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Storage details stay in the logs
        let message = match self {
            AppError::Database(_) | AppError::Config(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": message,
        }))
    }
}

/// Client-side failures.
///
/// None of these is fatal to the host; each one degrades the notification
/// view to stale or offline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    #[error("failed to load notifications: {0}")]
    FetchFailed(String),

    #[error("failed to confirm read for {id}: {reason}")]
    ConfirmReadFailed { id: NotificationId, reason: String },

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("n1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized("expired".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Database("pool timed out".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn test_error_body_hides_storage_details() {
        let response = AppError::Database("relation \"notifications\" does not exist".into())
            .error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({"success": false, "error": "internal server error"})
        );

        let response = AppError::BadRequest("limit must be positive".into()).error_response();
        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "bad request: limit must be positive");
    }

    #[test]
    fn test_sync_error_messages() {
        let err = SyncError::ConfirmReadFailed {
            id: "n1".into(),
            reason: "status 503".into(),
        };
        assert_eq!(err.to_string(), "failed to confirm read for n1: status 503");
        assert_eq!(
            SyncError::ReconnectExhausted { attempts: 6 }.to_string(),
            "gave up reconnecting after 6 attempts"
        );
    }
}
