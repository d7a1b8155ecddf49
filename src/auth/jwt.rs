use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::{
    config::JwtConfig,
    error::{AppError, AppResult},
};

/// Reset links are good for a fixed 15 minutes.
const RESET_TTL: Duration = Duration::from_secs(15 * 60);

/// Signing and verification keys, built once from [`JwtConfig`] at startup.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    session_ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            session_ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    fn sign_at(&self, user_id: Uuid, kind: TokenKind, now: OffsetDateTime) -> anyhow::Result<String> {
        let ttl = match kind {
            TokenKind::Session => self.session_ttl,
            TokenKind::Reset => RESET_TTL,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_session(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_at(user_id, TokenKind::Session, OffsetDateTime::now_utc())
    }

    pub fn sign_reset(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_at(user_id, TokenKind::Reset, OffsetDateTime::now_utc())
    }

    /// Checks signature, expiry, issuer and audience. No clock leeway: a
    /// token is dead the second `exp` passes.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            AppError::InvalidToken
        })?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_session(&self, token: &str) -> AppResult<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Session {
            warn!(user_id = %claims.sub, "non-session token presented as session");
            return Err(AppError::InvalidToken);
        }
        Ok(claims)
    }

    /// A reset token is only good for the user it was issued to.
    pub fn verify_reset(&self, token: &str, expected_user: Uuid) -> AppResult<Claims> {
        let unauthorized = || AppError::Unauthorized("Invalid or expired token".into());
        let claims = self.verify(token).map_err(|_| unauthorized())?;
        if claims.kind != TokenKind::Reset || claims.sub != expected_user {
            warn!(user_id = %expected_user, token_sub = %claims.sub, "reset token mismatch");
            return Err(unauthorized());
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 60,
        })
    }

    #[test]
    fn sign_and_verify_session_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_session(user_id).expect("sign session");
        let claims = keys.verify_session(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Session);
        assert_eq!(claims.exp - claims.iat, 60 * 60);
    }

    #[test]
    fn reset_token_expires_after_fifteen_minutes() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_reset(user_id).expect("sign reset");
        let claims = keys.verify_reset(&token, user_id).expect("verify reset");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn verify_reset_rejects_expired_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let user_id = Uuid::new_v4();
        let issued = OffsetDateTime::now_utc() - TimeDuration::minutes(20);
        let token = keys.sign_at(user_id, TokenKind::Reset, issued).unwrap();
        let err = keys.verify_reset(&token, user_id).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn reset_token_dies_right_at_expiry() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let user_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let stale = now - TimeDuration::minutes(15) - TimeDuration::seconds(30);
        let token = keys.sign_at(user_id, TokenKind::Reset, stale).unwrap();
        assert!(matches!(keys.verify_reset(&token, user_id), Err(AppError::Unauthorized(_))));

        let fresh = now - TimeDuration::minutes(14);
        let token = keys.sign_at(user_id, TokenKind::Reset, fresh).unwrap();
        assert!(keys.verify_reset(&token, user_id).is_ok());
    }

    #[test]
    fn expired_session_token_gets_no_grace_period() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let issued = OffsetDateTime::now_utc() - TimeDuration::minutes(60) - TimeDuration::seconds(5);
        let token = keys.sign_at(Uuid::new_v4(), TokenKind::Session, issued).unwrap();
        assert!(matches!(keys.verify_session(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn verify_reset_rejects_other_users_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.sign_reset(Uuid::new_v4()).unwrap();
        let err = keys.verify_reset(&token, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn session_and_reset_tokens_are_not_interchangeable() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let user_id = Uuid::new_v4();
        let reset = keys.sign_reset(user_id).unwrap();
        assert!(matches!(keys.verify_session(&reset), Err(AppError::InvalidToken)));
        let session = keys.sign_session(user_id).unwrap();
        assert!(matches!(keys.verify_reset(&session, user_id), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn verify_rejects_wrong_secret_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let token = good.sign_session(Uuid::new_v4()).unwrap();
        for bad in [
            make_keys("other-secret", "good-iss", "good-aud"),
            make_keys("same-secret", "bad-iss", "good-aud"),
            make_keys("same-secret", "good-iss", "bad-aud"),
        ] {
            assert!(matches!(bad.verify(&token), Err(AppError::InvalidToken)));
        }
    }

    #[test]
    fn verify_rejects_garbage() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert!(matches!(keys.verify("not.a.jwt"), Err(AppError::InvalidToken)));
    }
}
