/// Handshake authentication for WebSocket sessions (HS256 JWT)
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// `admin`, `driver`, `investor`, or any other role name
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investor_id: Option<String>,
}

impl Claims {
    pub fn new(sub: impl Into<String>, role: impl Into<String>, ttl: Duration) -> Self {
        Self {
            sub: sub.into(),
            role: role.into(),
            exp: (Utc::now() + ttl).timestamp(),
            driver_id: None,
            investor_id: None,
        }
    }
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

pub fn issue_token(claims: &Claims, secret: &str) -> Result<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Config(format!("failed to sign token: {}", e)))
}
