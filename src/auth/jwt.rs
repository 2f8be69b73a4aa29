use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, Role};
use crate::{config::JwtConfig, state::AppState};

/// Signing and verification keys plus token settings.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_days.max(0) as u64) * 24 * 60 * 60),
        }
    }

    pub fn issue(&self, principal_id: Uuid, email: &str, role: Role) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: principal_id,
            email: email.to_string(),
            role,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(principal_id = %principal_id, role = %role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(principal_id = %data.claims.sub, role = %data.claims.role, "jwt verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str, ttl_days: i64) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_days,
        })
    }

    #[test]
    fn issue_and_verify_carries_role() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud", 7);
        let id = Uuid::new_v4();
        let token = keys.issue(id, "dev@example.com", Role::Developer).expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Developer);
        assert_eq!(claims.email, "dev@example.com");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
    }

    #[test]
    fn token_lives_seven_days() {
        let keys = make_keys("s", "i", "a", 7);
        let token = keys.issue(Uuid::new_v4(), "a@b.co", Role::User).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn verify_rejects_wrong_secret_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud", 7);
        let other_aud = make_keys("same-secret", "good-iss", "bad-aud", 7);
        let other_secret = make_keys("other-secret", "good-iss", "good-aud", 7);
        let token = good.issue(Uuid::new_v4(), "a@b.co", Role::Admin).unwrap();
        assert!(other_aud.verify(&token).is_err());
        assert!(other_secret.verify(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let keys = make_keys("s", "i", "a", 0);
        // Validation::default() allows 60s leeway; forge an older token instead.
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "old@example.com".into(),
            role: Role::User,
            iat: now - 7200,
            exp: now - 3600,
            iss: "i".into(),
            aud: "a".into(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&token).is_err());
    }
}
