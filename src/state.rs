use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    activities::repo::{ActivityStore, PgActivityStore},
    clients::repo::{PgUserStore, UserStore},
    config::AppConfig,
    db,
    developers::repo::{DeveloperStore, PgDeveloperStore},
    email::{
        provider::{EmailProvider, ResendProvider},
        repo::{EmailLogStore, PgEmailLogStore},
        services::{EmailService, RetryPolicy, SenderIdentity},
    },
    messages::repo::{MessageStore, PgMessageStore},
    notifier::{
        repo::{BatchStore, PgBatchStore},
        NotificationQueue,
    },
    rate_limit::{InMemoryRateLimitStore, RateLimiter},
    request_log::RequestLog,
    verification::{
        repo::{PendingStore, PgPendingStore},
        VerificationService,
    },
};
#[cfg(test)]
use crate::{
    activities::repo::InMemoryActivityStore, clients::repo::InMemoryUserStore,
    developers::repo::InMemoryDeveloperStore, email::repo::InMemoryEmailLogStore,
    messages::repo::InMemoryMessageStore, notifier::repo::InMemoryBatchStore,
    verification::repo::InMemoryPendingStore,
};

const HOUSEKEEPING_EVERY: Duration = Duration::from_secs(10 * 60);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub developers: Arc<dyn DeveloperStore>,
    pub activities: Arc<dyn ActivityStore>,
    pub messages: Arc<dyn MessageStore>,
    pub email: Arc<EmailService>,
    pub verification: Arc<VerificationService>,
    pub notifier: NotificationQueue,
    pub rate_limiter: Arc<RateLimiter>,
    pub request_log: Arc<RequestLog>,
}

struct Stores {
    users: Arc<dyn UserStore>,
    developers: Arc<dyn DeveloperStore>,
    activities: Arc<dyn ActivityStore>,
    messages: Arc<dyn MessageStore>,
    pending: Arc<dyn PendingStore>,
    email_logs: Arc<dyn EmailLogStore>,
    batches: Arc<dyn BatchStore>,
}

impl AppState {
    /// Postgres-backed state for the running server.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;

        let provider = match config.email.api_key.as_deref() {
            Some(key) => Some(Arc::new(ResendProvider::new(key)?) as Arc<dyn EmailProvider>),
            None => None,
        };

        let stores = Stores {
            users: Arc::new(PgUserStore::new(pool.clone())),
            developers: Arc::new(PgDeveloperStore::new(pool.clone())),
            activities: Arc::new(PgActivityStore::new(pool.clone())),
            messages: Arc::new(PgMessageStore::new(pool.clone())),
            pending: Arc::new(PgPendingStore::new(pool.clone())),
            email_logs: Arc::new(PgEmailLogStore::new(pool.clone())),
            batches: Arc::new(PgBatchStore::new(pool)),
        };
        let state = Self::assemble(config, provider, stores).await?;
        state.spawn_housekeeping();
        Ok(state)
    }

    /// Same wiring over in-memory stores, with an optional stand-in email provider.
    #[cfg(test)]
    pub async fn in_memory(
        config: AppConfig,
        provider: Option<Arc<dyn EmailProvider>>,
    ) -> anyhow::Result<Self> {
        let stores = Stores {
            users: Arc::new(InMemoryUserStore::default()),
            developers: Arc::new(InMemoryDeveloperStore::default()),
            activities: Arc::new(InMemoryActivityStore::default()),
            messages: Arc::new(InMemoryMessageStore::default()),
            pending: Arc::new(InMemoryPendingStore::default()),
            email_logs: Arc::new(InMemoryEmailLogStore::default()),
            batches: Arc::new(InMemoryBatchStore::default()),
        };
        Self::assemble(config, provider, stores).await
    }

    async fn assemble(
        config: AppConfig,
        provider: Option<Arc<dyn EmailProvider>>,
        stores: Stores,
    ) -> anyhow::Result<Self> {
        let email = Arc::new(EmailService::new(
            provider,
            SenderIdentity::from_config(&config.email),
            stores.email_logs,
            RetryPolicy::from_config(&config.email),
        ));
        let verification = Arc::new(VerificationService::new(stores.pending, email.clone()));
        let notifier = NotificationQueue::start(
            email.clone(),
            stores.batches,
            Duration::from_millis(config.email.notify_interval_ms),
        )
        .await?;
        let rate_limiter = Arc::new(RateLimiter::from_config(
            Arc::new(InMemoryRateLimitStore::default()),
            &config.rate_limit,
        ));
        let request_log = Arc::new(RequestLog::new(
            config.request_log_file.clone(),
            config.request_log_max_lines,
        ));
        info!(
            email_enabled = email.is_configured(),
            admin_override = config.admin_override.is_some(),
            "application state ready"
        );

        Ok(Self {
            config: Arc::new(config),
            users: stores.users,
            developers: stores.developers,
            activities: stores.activities,
            messages: stores.messages,
            email,
            verification,
            notifier,
            rate_limiter,
            request_log,
        })
    }

    /// Periodically drops expired verification records and idle rate-limit keys.
    fn spawn_housekeeping(&self) {
        let verification = self.verification.clone();
        let rate_limiter = self.rate_limiter.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(HOUSEKEEPING_EVERY);
            loop {
                tick.tick().await;
                match verification.purge_expired().await {
                    Ok(n) => debug!(purged = n, "expired verifications purged"),
                    Err(e) => warn!(error = %e, "verification purge failed"),
                }
                let dropped = rate_limiter.sweep().await;
                debug!(dropped, "idle rate limit keys dropped");
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Config for tests; `extra` pairs override the defaults.
    pub fn test_config(extra: &[(&str, &str)]) -> AppConfig {
        let log_file = std::env::temp_dir()
            .join(format!("arena-test-{}", uuid::Uuid::new_v4()))
            .join("requests.log");
        let log_file = log_file.to_string_lossy().into_owned();
        let mut pairs: Vec<(String, String)> = vec![
            ("DATABASE_URL".into(), "postgres://unused".into()),
            ("JWT_SECRET".into(), "test-secret".into()),
            ("RESEND_FROM_EMAIL".into(), "hello@websitesarena.com".into()),
            ("RESEND_FROM_NAME".into(), "Websites Arena".into()),
            ("ADMIN_EMAIL".into(), "owner@websitesarena.com".into()),
            ("EMAIL_MAX_RETRIES".into(), "1".into()),
            ("EMAIL_RETRY_BACKOFF_MS".into(), "1".into()),
            ("NOTIFY_INTERVAL_MS".into(), "1".into()),
            ("REQUEST_LOG_FILE".into(), log_file),
        ];
        for (k, v) in extra {
            pairs.retain(|(key, _)| key != k);
            pairs.push((k.to_string(), v.to_string()));
        }
        AppConfig::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
        .expect("test config is valid")
    }
}
