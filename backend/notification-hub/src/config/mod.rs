use resilience::BackoffConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::store::ListQuery;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Falls back to the in-memory store when unset
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret used to verify WebSocket handshake tokens
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    pub heartbeat_interval: Duration,
    /// Drop the connection after this long without a pong
    pub client_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// In-memory store, fixed secret, loopback on an ephemeral port
    pub fn test_defaults() -> Self {
        Config {
            app: AppConfig {
                env: "test".to_string(),
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 1,
            },
            auth: AuthConfig {
                jwt_secret: "test-secret".to_string(),
            },
            websocket: WebSocketConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("APP_PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            },
            auth: AuthConfig {
                jwt_secret: std::env::var("JWT_SECRET")?,
            },
            websocket: WebSocketConfig {
                heartbeat_interval: Duration::from_secs(
                    std::env::var("WS_HEARTBEAT_INTERVAL_SECS")
                        .unwrap_or_else(|_| "5".to_string())
                        .parse()?,
                ),
                client_timeout: Duration::from_secs(
                    std::env::var("WS_CLIENT_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()?,
                ),
            },
        })
    }
}

/// Settings for a client session talking to the hub
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// e.g. `http://localhost:8000`
    pub http_base_url: String,
    /// e.g. `ws://localhost:8000/ws`
    pub ws_url: String,
    pub page_size: u32,
    pub request_timeout: Duration,
    /// Silence longer than this counts as a dead connection
    pub heartbeat_timeout: Duration,
    pub reconnect: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_base_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000/ws".to_string(),
            page_size: 20,
            request_timeout: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(45),
            reconnect: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = ClientConfig::default();
        let mut reconnect = defaults.reconnect.clone();
        if let Ok(v) = std::env::var("HUB_RECONNECT_MAX_ATTEMPTS") {
            reconnect.max_attempts = v.parse()?;
        }
        if let Ok(v) = std::env::var("HUB_RECONNECT_MAX_DELAY_MS") {
            reconnect.max_delay = Duration::from_millis(v.parse()?);
        }

        Ok(ClientConfig {
            http_base_url: std::env::var("HUB_HTTP_URL").unwrap_or(defaults.http_base_url),
            ws_url: std::env::var("HUB_WS_URL").unwrap_or(defaults.ws_url),
            page_size: std::env::var("HUB_PAGE_SIZE")
                .unwrap_or_else(|_| defaults.page_size.to_string())
                .parse::<u32>()?
                .clamp(1, ListQuery::MAX_LIMIT),
            request_timeout: Duration::from_millis(
                std::env::var("HUB_REQUEST_TIMEOUT_MS")
                    .unwrap_or_else(|_| defaults.request_timeout.as_millis().to_string())
                    .parse()?,
            ),
            heartbeat_timeout: defaults.heartbeat_timeout,
            reconnect,
        })
    }
}
