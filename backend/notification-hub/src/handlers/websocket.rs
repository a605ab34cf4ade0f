/// WebSocket handshake and connection statistics
///
/// Clients connect to `/ws?token=<jwt>` (or send `Authorization: Bearer`).
/// The token decides the session scope; the client then sends `join`.
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::json;

use crate::auth::verify_token;
use crate::error::{AppError, Result};
use crate::routing::scope_for_claims;
use crate::state::AppState;
use crate::websocket::WsSession;

#[derive(Debug, Deserialize)]
pub struct HandshakeParams {
    pub token: Option<String>,
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// GET /ws
pub async fn ws_handshake(
    req: HttpRequest,
    stream: web::Payload,
    params: web::Query<HandshakeParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let token = params
        .into_inner()
        .token
        .or_else(|| bearer_token(&req))
        .ok_or_else(|| AppError::Unauthorized("missing token".to_string()))?;

    let claims = verify_token(&token, &state.config.auth.jwt_secret)?;
    let scope = scope_for_claims(&claims);
    tracing::info!(sub = %claims.sub, scope = %scope, "WebSocket handshake accepted");

    let session = WsSession::new(
        scope,
        state.registry.clone(),
        state.config.websocket.clone(),
    );
    ws::start(session, &req, stream).map_err(|e| {
        tracing::warn!(error = %e, "WebSocket upgrade failed");
        AppError::BadRequest(e.to_string())
    })
}

/// GET /ws/stats
pub async fn ws_stats(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "rooms": state.registry.room_count().await,
        "connections": state.registry.total_connections().await,
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_handshake))
        .route("/ws/stats", web::get().to(ws_stats));
}
