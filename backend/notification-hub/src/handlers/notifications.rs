/// Notification REST handlers
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{CreateNotificationRequest, Cursor, NotificationId, RecipientScope};
use crate::state::AppState;
use crate::store::ListQuery;

/// Query string for `GET /notifications`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub before: Option<DateTime<Utc>>,
    pub before_id: Option<String>,
    pub recipient_id: Option<String>,
    /// Kind of an explicit recipient; `user` when absent
    pub recipient_kind: Option<String>,
    pub driver_id: Option<String>,
    pub investor_id: Option<String>,
}

impl ListParams {
    /// At most one scope parameter; none means the admin feed.
    pub fn scope(&self) -> Result<RecipientScope> {
        if self.recipient_kind.is_some() && self.recipient_id.is_none() {
            return Err(AppError::BadRequest(
                "recipientKind requires recipientId".to_string(),
            ));
        }
        match (&self.recipient_id, &self.driver_id, &self.investor_id) {
            (None, None, None) => Ok(RecipientScope::Admin),
            (Some(id), None, None) => {
                let kind = self.recipient_kind.as_deref().unwrap_or("user");
                Ok(RecipientScope::explicit(kind, id.as_str()))
            }
            (None, Some(id), None) => Ok(RecipientScope::Driver(id.clone())),
            (None, None, Some(id)) => Ok(RecipientScope::Investor(id.clone())),
            _ => Err(AppError::BadRequest(
                "only one of recipientId, driverId, investorId may be given".to_string(),
            )),
        }
    }

    pub fn cursor(&self) -> Result<Option<Cursor>> {
        match (self.before, &self.before_id) {
            (None, None) => Ok(None),
            (Some(created_at), Some(id)) => Ok(Some(Cursor {
                created_at,
                id: NotificationId::new(id.as_str()),
            })),
            _ => Err(AppError::BadRequest(
                "before and beforeId must be given together".to_string(),
            )),
        }
    }

    pub fn to_query(&self) -> Result<ListQuery> {
        Ok(ListQuery::new(self.limit)
            .with_page(self.page)
            .before(self.cursor()?))
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchReadRequest {
    pub ids: Vec<NotificationId>,
}

/// GET /notifications
pub async fn list_notifications(
    state: web::Data<AppState>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let scope = params.scope()?;
    let query = params.to_query()?;
    let page = state.service.list_notifications(&scope, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// POST /notifications
pub async fn create_notification(
    state: web::Data<AppState>,
    req: web::Json<CreateNotificationRequest>,
) -> Result<HttpResponse> {
    let notification = state.service.create_notification(req.into_inner()).await?;
    Ok(HttpResponse::Created().json(notification))
}

/// GET /notifications/{id}
pub async fn get_notification(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = NotificationId::new(path.into_inner());
    let notification = state.service.get_notification(&id).await?;
    Ok(HttpResponse::Ok().json(notification))
}

/// POST /notifications/{id}/read
pub async fn mark_as_read(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = NotificationId::new(path.into_inner());
    state.service.mark_as_read(&id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

/// POST /notifications/read
pub async fn mark_many_as_read(
    state: web::Data<AppState>,
    body: web::Json<BatchReadRequest>,
) -> Result<HttpResponse> {
    let updated = state.service.mark_many_as_read(&body.ids).await?;
    Ok(HttpResponse::Ok().json(json!({ "updated": updated })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    // The literal batch route must precede the `{id}` routes
    cfg.service(
        web::scope("/notifications")
            .route("", web::get().to(list_notifications))
            .route("", web::post().to(create_notification))
            .route("/read", web::post().to(mark_many_as_read))
            .route("/{id}", web::get().to(get_notification))
            .route("/{id}/read", web::post().to(mark_as_read)),
    );
}
