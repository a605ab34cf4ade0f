/// HTTP handlers for the notification hub
pub mod notifications;
pub mod websocket;

use actix_web::web;

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    notifications::register_routes(cfg);
    websocket::register_routes(cfg);
}
