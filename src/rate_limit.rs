use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    async_trait,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{api::client_ip, config::RateLimitConfig, error::AppError, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited,
}

/// Per-key request history for a sliding window.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Drops hits older than `window`, refuses when `max` remain, else records `now`.
    async fn hit(&self, key: &str, now: Instant, window: Duration, max: usize) -> Decision;
    /// Forgets keys with no hit inside `window`. Returns how many were dropped.
    async fn sweep(&self, now: Instant, window: Duration) -> usize;
}

#[derive(Default)]
pub struct InMemoryRateLimitStore {
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, now: Instant, window: Duration, max: usize) -> Decision {
        let mut hits = self.hits.lock().await;
        let stamps = hits.entry(key.to_string()).or_default();
        stamps.retain(|t| now.saturating_duration_since(*t) <= window);
        if stamps.len() >= max {
            return Decision::Limited;
        }
        stamps.push(now);
        Decision::Allowed
    }

    async fn sweep(&self, now: Instant, window: Duration) -> usize {
        let mut hits = self.hits.lock().await;
        let before = hits.len();
        hits.retain(|_, stamps| {
            stamps
                .last()
                .is_some_and(|t| now.saturating_duration_since(*t) <= window)
        });
        before - hits.len()
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    max: usize,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, window: Duration, max: usize) -> Self {
        Self { store, window, max }
    }

    pub fn from_config(store: Arc<dyn RateLimitStore>, cfg: &RateLimitConfig) -> Self {
        Self::new(store, Duration::from_secs(cfg.window_secs), cfg.max_requests)
    }

    pub async fn check(&self, key: &str) -> Decision {
        self.store.hit(key, Instant::now(), self.window, self.max).await
    }

    pub async fn sweep(&self) -> usize {
        self.store.sweep(Instant::now(), self.window).await
    }
}

/// Rejects a client once it has spent its quota for the current window.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = client_ip(&req, state.config.trust_proxy);
    match state.rate_limiter.check(&ip).await {
        Decision::Allowed => next.run(req).await,
        Decision::Limited => {
            warn!(%ip, path = %req.uri().path(), "rate limit exceeded");
            AppError::RateLimited.into_response()
        }
    }
}
