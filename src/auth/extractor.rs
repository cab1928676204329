use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use uuid::Uuid;

use crate::auth::tokens::{Claims, TokenType};
use crate::error::ApiError;
use crate::state::AppState;

/// The caller identified by a valid `Authorization: Bearer <access token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub claims: Claims,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))?
            .to_str()
            .map_err(|_| ApiError::unauthorized("Authorization header is not valid text"))?;

        let token = bearer_token(header)
            .ok_or_else(|| ApiError::unauthorized("Authorization header must use the Bearer scheme"))?;

        let claims = state.tokens.verify(token, TokenType::Access)?;

        Ok(AuthUser { user_id: claims.sub, claims })
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
