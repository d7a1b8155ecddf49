use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::repo_types::User;

/// Request body for registration.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Self-service profile update; absent or empty fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Admin update; `isAdmin` accepts any boolean spelling.
#[derive(Debug, Default, Deserialize)]
pub struct AdminUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "isAdmin")]
    pub is_admin: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
}

/// Profile payload returned by register, login and the profile routes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub message: &'static str,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ProfileResponse {
    pub fn new(message: &'static str, user: &User) -> Self {
        Self {
            message,
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            token: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedUserResponse {
    pub message: &'static str,
    pub updated_user: User,
}
