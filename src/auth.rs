use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use crate::router::AppState;

/// The authenticated caller, resolved from the bearer token before any
/// handler logic runs. Per-request value, never shared process state.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("Token "))
            .ok_or(ApiError::Unauthorized)?;

        let user_id = state
            .store
            .user_for_token(&hash_token(token))?
            .ok_or(ApiError::Unauthorized)?;

        Ok(AuthUser { id: user_id })
    }
}

pub fn generate_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Tokens are stored hashed; a leaked database does not leak credentials.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
