//! Field rules applied to request bodies before any account logic runs.
//! The first failing rule becomes the 400 message.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn invalid(msg: &str) -> AppError {
    AppError::Validation(msg.into())
}

/// Trimmed, non-empty value or `None`.
pub(crate) fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn required_email(value: Option<String>) -> AppResult<String> {
    let email = present(value).ok_or_else(|| invalid("Email is required"))?;
    checked_email(&email)
}

pub(crate) fn checked_email(email: &str) -> AppResult<String> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(invalid("Please enter a valid email address"));
    }
    Ok(email)
}

pub(crate) fn required_name(value: Option<String>) -> AppResult<String> {
    present(value).ok_or_else(|| invalid("Name is required"))
}

/// Passwords are only checked for presence here; login must not leak the
/// length rule.
pub(crate) fn required_password(value: Option<String>) -> AppResult<String> {
    value
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| invalid("Password is required"))
}

pub(crate) fn new_password(value: Option<String>) -> AppResult<String> {
    let password = required_password(value)?;
    checked_password_len(password)
}

pub(crate) fn checked_password_len(password: String) -> AppResult<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid("Password must be at least 6 characters"));
    }
    Ok(password)
}

/// Accepts the boolean spellings a form or JSON client may send.
pub(crate) fn coerce_admin_flag(value: &Value) -> AppResult<bool> {
    let flag = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    flag.ok_or_else(|| invalid("isAdmin value should be true/false"))
}

pub(crate) fn parse_user_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| invalid("Invalid ID: must be a valid user id"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn email_rules() {
        assert!(is_valid_email("ann@x.com"));
        assert!(!is_valid_email("ann@x"));
        assert!(!is_valid_email("ann x@x.com"));
        assert_eq!(required_email(Some("  Ann@X.COM ".into())).unwrap(), "ann@x.com");
        assert!(matches!(
            required_email(Some("   ".into())),
            Err(AppError::Validation(m)) if m == "Email is required"
        ));
        assert!(matches!(
            required_email(Some("nope".into())),
            Err(AppError::Validation(m)) if m == "Please enter a valid email address"
        ));
    }

    #[test]
    fn password_rules() {
        assert!(required_password(Some("x".into())).is_ok());
        assert!(required_password(None).is_err());
        assert!(new_password(Some("12345".into())).is_err());
        assert_eq!(new_password(Some("123456".into())).unwrap(), "123456");
    }

    #[test]
    fn admin_flag_coercion() {
        assert!(coerce_admin_flag(&json!(true)).unwrap());
        assert!(!coerce_admin_flag(&json!("false")).unwrap());
        assert!(coerce_admin_flag(&json!(1)).unwrap());
        assert!(!coerce_admin_flag(&json!("0")).unwrap());
        assert!(coerce_admin_flag(&json!("yes")).is_err());
        assert!(coerce_admin_flag(&json!([])).is_err());
    }

    #[test]
    fn user_id_parsing() {
        let id = Uuid::new_v4();
        assert_eq!(parse_user_id(&id.to_string()).unwrap(), id);
        assert!(parse_user_id("42").is_err());
    }
}
