use anyhow::Context;
use lettre::{message::Mailbox, Address};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{
        AdminUpdateRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, ResetRequest,
        UpdateProfileRequest,
    },
    repo_types::{NewUser, User},
    validation::{
        checked_email, checked_password_len, coerce_admin_flag, new_password, present,
        required_email, required_name, required_password,
    },
};
use crate::{
    auth::password::{hash_password, verify_password},
    error::{AppError, AppResult},
    mail::OutgoingMail,
    state::AppState,
};

/// A user together with a freshly issued session token.
pub struct Session {
    pub user: User,
    pub token: String,
}

fn issue_session(state: &AppState, user: User) -> AppResult<Session> {
    let token = state.keys.sign_session(user.id)?;
    Ok(Session { user, token })
}

// The row can vanish between load and save; that is still a 404.
async fn save_user(state: &AppState, user: &User) -> AppResult<User> {
    state
        .users
        .save(user)
        .await?
        .ok_or_else(AppError::user_not_found)
}

async fn load_user(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(AppError::user_not_found)
}

pub async fn register(state: &AppState, req: RegisterRequest) -> AppResult<Session> {
    let email = required_email(req.email)?;
    let password = new_password(req.password)?;
    let name = required_name(req.name)?;

    // Advisory only: the unique index decides races.
    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict(
            "User already exists. Please choose a different email.".into(),
        ));
    }

    let password_hash = hash_password(&password)?;
    let user = state
        .users
        .create(NewUser {
            name,
            email,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, "user registered");
    issue_session(state, user)
}

pub async fn login(state: &AppState, req: LoginRequest) -> AppResult<Session> {
    let email = required_email(req.email)?;
    let password = required_password(req.password)?;

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::NotFound(
            "Invalid email address. Please check your email and try again.".into(),
        ));
    };

    if !verify_password(&password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized(
            "Invalid password. Please check your password and try again.".into(),
        ));
    }

    info!(user_id = %user.id, "user logged in");
    issue_session(state, user)
}

pub async fn profile(state: &AppState, user_id: Uuid) -> AppResult<User> {
    load_user(state, user_id).await
}

pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> AppResult<User> {
    let name = present(req.name);
    let email = present(req.email).map(|e| checked_email(&e)).transpose()?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .map(checked_password_len)
        .transpose()?;

    let mut user = load_user(state, user_id).await?;
    if let Some(name) = name {
        user.name = name;
    }
    if let Some(email) = email {
        user.email = email;
    }
    if let Some(password) = password {
        user.password_hash = hash_password(&password)?;
    }

    let user = save_user(state, &user).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(user)
}

/// Admins or non-admins; an empty result is a 404.
pub async fn list_users(state: &AppState, admins: bool) -> AppResult<Vec<User>> {
    let users = state.users.list_by_admin(admins).await?;
    if users.is_empty() {
        let message = if admins { "No admins found!" } else { "No users found!" };
        return Err(AppError::NotFound(message.into()));
    }
    Ok(users)
}

pub async fn get_user(state: &AppState, id: Uuid) -> AppResult<User> {
    load_user(state, id).await
}

pub async fn admin_update(state: &AppState, id: Uuid, req: AdminUpdateRequest) -> AppResult<User> {
    let name = present(req.name);
    let email = present(req.email).map(|e| checked_email(&e)).transpose()?;
    let is_admin = req.is_admin.as_ref().map(coerce_admin_flag).transpose()?;

    let mut user = load_user(state, id).await?;
    if let Some(name) = name {
        user.name = name;
    }
    if let Some(email) = email {
        user.email = email;
    }
    if let Some(is_admin) = is_admin {
        user.is_admin = is_admin;
    }

    let user = save_user(state, &user).await?;
    info!(user_id = %user.id, is_admin = user.is_admin, "user updated by admin");
    Ok(user)
}

pub async fn delete_user(state: &AppState, id: Uuid) -> AppResult<()> {
    if !state.users.delete(id).await? {
        return Err(AppError::user_not_found());
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn reset_mail(state: &AppState, user: &User, link: &str) -> AppResult<OutgoingMail> {
    let sender = &state.config.mail.from_name;
    let address: Address = state
        .config
        .mail
        .from_address
        .parse()
        .context("parse EMAIL_FROM")?;
    Ok(OutgoingMail {
        from: Mailbox::new(Some(sender.clone()), address),
        to: user.email.clone(),
        subject: "Password Reset".into(),
        html: format!(
            r#"<p>Hi {name},</p>
<p>We received a password reset request for your account. Click the link below to set a new password:</p>
<p><a href="{link}" target="_blank">{link}</a></p>
<p>If you didn't request this, you can ignore this email.</p>
<p>Thanks,<br>{team} Team</p>"#,
            name = escape_html(&user.name),
            team = escape_html(sender),
        ),
    })
}

/// Mails a link of the form `{frontend}/reset-password/{id}/{token}`.
pub async fn request_password_reset(state: &AppState, req: ResetRequest) -> AppResult<()> {
    let email = required_email(req.email)?;
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    let token = state.keys.sign_reset(user.id)?;
    let link = format!(
        "{}/reset-password/{}/{}",
        state.config.frontend_url, user.id, token
    );
    state.mailer.send(reset_mail(state, &user, &link)?).await?;

    info!(user_id = %user.id, "password reset requested");
    Ok(())
}

// The token stays valid until it expires, even after a successful reset.
pub async fn reset_password(
    state: &AppState,
    id: Uuid,
    token: &str,
    req: ResetPasswordRequest,
) -> AppResult<()> {
    let password = new_password(req.password)?;
    if token.trim().is_empty() {
        return Err(AppError::Validation("Token is required".into()));
    }

    let mut user = load_user(state, id).await?;
    state.keys.verify_reset(token, user.id)?;

    user.password_hash = hash_password(&password)?;
    save_user(state, &user).await?;

    info!(user_id = %user.id, "password reset");
    Ok(())
}
