use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

use crate::auth::password::hash_password;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub api_key: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub admin_email: Option<String>,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub notify_interval_ms: u64,
}

/// Admin credentials that start the admin escalation flow. Only the argon2
/// hash of the password is kept.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminOverride {
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub client_url: Option<String>,
    pub max_file_size: usize,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
    pub admin_override: Option<AdminOverride>,
    pub rate_limit: RateLimitConfig,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`. Only safe behind a proxy that sets them.
    pub trust_proxy: bool,
    pub request_log_file: PathBuf,
    pub request_log_max_lines: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: get("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "websites-arena".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "websites-arena-clients".into()),
            ttl_days: parse_or(get("JWT_TTL_DAYS"), "JWT_TTL_DAYS", 7)?,
        };

        let email = EmailConfig {
            api_key: get("RESEND_API_KEY"),
            from_email: get("RESEND_FROM_EMAIL"),
            from_name: get("RESEND_FROM_NAME"),
            admin_email: get("ADMIN_EMAIL").map(|e| e.to_lowercase()),
            max_retries: parse_or(get("EMAIL_MAX_RETRIES"), "EMAIL_MAX_RETRIES", 3)?,
            retry_backoff_ms: parse_or(get("EMAIL_RETRY_BACKOFF_MS"), "EMAIL_RETRY_BACKOFF_MS", 1000)?,
            notify_interval_ms: parse_or(get("NOTIFY_INTERVAL_MS"), "NOTIFY_INTERVAL_MS", 1000)?,
        };

        // Both halves must be present, otherwise escalation stays disabled.
        let admin_override = match (get("ADMIN_OVERRIDE_EMAIL"), get("ADMIN_OVERRIDE_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminOverride {
                email: email.to_lowercase(),
                password_hash: hash_password(&password).context("hash ADMIN_OVERRIDE_PASSWORD")?,
            }),
            _ => None,
        };

        let port = match get("PORT").or_else(|| get("APP_PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got {raw:?}"))?,
            None => 5000,
        };

        Ok(Self {
            database_url,
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            client_url: get("CLIENT_URL"),
            max_file_size: parse_or(get("MAX_FILE_SIZE"), "MAX_FILE_SIZE", 5 * 1024 * 1024)?,
            jwt,
            email,
            admin_override,
            rate_limit: RateLimitConfig {
                window_secs: parse_or(get("RATE_LIMIT_WINDOW_SECS"), "RATE_LIMIT_WINDOW_SECS", 15 * 60)?,
                max_requests: parse_or(get("RATE_LIMIT_MAX"), "RATE_LIMIT_MAX", 200)?,
            },
            trust_proxy: parse_or(get("TRUST_PROXY"), "TRUST_PROXY", false)?,
            request_log_file: get("REQUEST_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs/requests.log")),
            request_log_max_lines: parse_or(get("REQUEST_LOG_MAX_LINES"), "REQUEST_LOG_MAX_LINES", 200)?,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value {v:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/arena"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .expect("config should parse");

        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.jwt.ttl_days, 7);
        assert_eq!(cfg.rate_limit.window_secs, 900);
        assert_eq!(cfg.rate_limit.max_requests, 200);
        assert_eq!(cfg.email.max_retries, 3);
        assert_eq!(cfg.request_log_max_lines, 200);
        assert!(cfg.admin_override.is_none());
        assert!(cfg.email.api_key.is_none());
        assert!(!cfg.trust_proxy);
    }

    #[test]
    fn missing_jwt_secret_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn malformed_numbers_fail_fast() {
        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("RATE_LIMIT_MAX", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_MAX"));
    }

    #[test]
    fn admin_override_needs_both_halves() {
        let half = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("ADMIN_OVERRIDE_EMAIL", "Boss@Example.com"),
        ]))
        .unwrap();
        assert!(half.admin_override.is_none());

        let full = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("ADMIN_OVERRIDE_EMAIL", "Boss@Example.com"),
            ("ADMIN_OVERRIDE_PASSWORD", "hunter2"),
            ("PORT", "8081"),
        ]))
        .unwrap();
        let ov = full.admin_override.unwrap();
        assert_eq!(ov.email, "boss@example.com");
        assert!(!ov.password_hash.contains("hunter2"));
        assert!(verify_password("hunter2", &ov.password_hash).unwrap());
        assert!(!verify_password("hunter3", &ov.password_hash).unwrap());
        assert_eq!(full.port, 8081);
    }
}
