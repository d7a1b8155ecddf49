use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::cookie::{extract_cookie, SESSION_COOKIE};
use crate::{error::AppError, state::AppState, users::repo_types::User};

/// Validates the session token and yields the caller's user ID.
///
/// The `jwt` cookie wins over an `Authorization: Bearer` header when both are
/// present.
pub struct AuthUser(pub Uuid);

/// An authenticated caller whose account carries the admin flag.
pub struct AdminUser(pub User);

fn bearer_token(parts: &Parts) -> Option<String> {
    let auth = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_cookie(&parts.headers, SESSION_COOKIE)
            .or_else(|| bearer_token(parts))
            .ok_or_else(|| AppError::Unauthorized("Not authorized, no token".into()))?;

        let claims = state.keys.verify_session(&token).map_err(|_| {
            warn!("invalid or expired session token");
            AppError::Unauthorized("Not authorized, token failed".into())
        })?;

        Ok(AuthUser(claims.sub))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;

        let user = state
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Not authorized, token failed".into()))?;

        if !user.is_admin {
            warn!(user_id = %user.id, "admin route denied");
            return Err(AppError::Forbidden("Not authorized as an admin".into()));
        }
        Ok(AdminUser(user))
    }
}
