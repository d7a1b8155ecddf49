//! The `jwt` session cookie that carries the session token alongside the
//! response body.

use axum::http::{header, HeaderMap, HeaderValue};

pub const SESSION_COOKIE: &str = "jwt";

pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear_session_cookie())
}

pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("jwt=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0")
}

pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_http_only_cookie() {
        let cookie = session_cookie("abc.def.ghi", 3600, false);
        let s = cookie.to_str().unwrap();
        assert!(s.starts_with("jwt=abc.def.ghi"));
        assert!(s.contains("HttpOnly"));
        assert!(s.contains("Max-Age=3600"));
        assert!(!s.contains("Secure"));
        assert!(session_cookie("t", 1, true).to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        assert!(clear_session_cookie().to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn extracts_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; jwt=tok123; x=y"));
        assert_eq!(extract_cookie(&headers, "jwt"), Some("tok123".into()));
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }

    #[test]
    fn empty_cookie_value_counts_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("jwt="));
        assert_eq!(extract_cookie(&headers, "jwt"), None);
    }
}
