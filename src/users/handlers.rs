use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        AdminUpdateRequest, LoginRequest, MessageResponse, ProfileResponse, RegisterRequest,
        ResetPasswordRequest, ResetRequest, UpdateProfileRequest, UpdatedUserResponse,
    },
    repo_types::User,
    services::{self, Session},
    validation::parse_user_id,
};
use crate::{
    auth::{
        cookie::{clear_session_cookie, session_cookie},
        AdminUser, AuthUser,
    },
    error::{AppResult, JsonBody},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register).get(list_users))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/profile", get(get_profile).put(update_profile))
        .route("/users/admins", get(list_admins))
        .route("/users/reset-password/request", post(request_reset))
        .route("/users/reset-password/reset/:id/:token", post(reset_password))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// Session token goes out twice: in the body and as the `jwt` cookie.
fn session_response(
    state: &AppState,
    status: StatusCode,
    message: &'static str,
    session: Session,
) -> impl IntoResponse {
    let cookie = session_cookie(
        &session.token,
        state.keys.session_ttl().as_secs(),
        state.config.cookie_secure,
    );
    let body = ProfileResponse::new(message, &session.user).with_token(session.token);
    (status, [(header::SET_COOKIE, cookie)], Json(body))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let session = services::register(&state, payload).await?;
    Ok(session_response(
        &state,
        StatusCode::CREATED,
        "Registration successful. Welcome!",
        session,
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let session = services::login(&state, payload).await?;
    Ok(session_response(&state, StatusCode::OK, "Login successful.", session))
}

/// Tokens are stateless; logging out only drops the cookie.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn logout(AuthUser(user_id): AuthUser) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(MessageResponse {
            message: "Logout successful",
        }),
    )
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ProfileResponse>> {
    let user = services::profile(&state, user_id).await?;
    Ok(Json(ProfileResponse::new(
        "User profile retrieved successfully",
        &user,
    )))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> AppResult<Json<ProfileResponse>> {
    let user = services::update_profile(&state, user_id, payload).await?;
    Ok(Json(ProfileResponse::new(
        "User profile updated successfully.",
        &user,
    )))
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(services::list_users(&state, false).await?))
}

#[instrument(skip_all)]
pub async fn list_admins(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(services::list_users(&state, true).await?))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let id = parse_user_id(&id)?;
    Ok(Json(services::get_user(&state, id).await?))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<AdminUpdateRequest>,
) -> AppResult<Json<UpdatedUserResponse>> {
    let id = parse_user_id(&id)?;
    let updated_user = services::admin_update(&state, id, payload).await?;
    Ok(Json(UpdatedUserResponse {
        message: "User updated",
        updated_user,
    }))
}

#[instrument(skip(state, _admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_user_id(&id)?;
    services::delete_user(&state, id).await?;
    Ok(Json(MessageResponse {
        message: "User deleted",
    }))
}

#[instrument(skip(state, payload))]
pub async fn request_reset(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    services::request_password_reset(&state, payload).await?;
    Ok(Json(MessageResponse {
        message: "Password reset email sent, please check your email.",
    }))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path((id, token)): Path<(String, String)>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_user_id(&id)?;
    services::reset_password(&state, id, &token, payload).await?;
    Ok(Json(MessageResponse {
        message: "Password successfully reset",
    }))
}
