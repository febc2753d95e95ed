use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::routes::user_fingerprint;

/// Windows are swept once the table grows past this many entries
const SWEEP_THRESHOLD: usize = 10_000;

/// Fixed-window request counter per user and endpoint class
#[derive(Clone)]
pub struct EndpointRateLimiter {
    state: Arc<Mutex<HashMap<(SyncEndpoint, String), RateWindow>>>,
    window: Duration,
    limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEndpoint {
    Push,
    Pull,
    Resolve,
}

#[derive(Default)]
struct RateLimitMetrics {
    allowed: [AtomicU64; 3],
    limited: [AtomicU64; 3],
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitMetricsSnapshot {
    pub push_allowed: u64,
    pub push_limited: u64,
    pub pull_allowed: u64,
    pub pull_limited: u64,
    pub resolve_allowed: u64,
    pub resolve_limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.rate_limit_window, config.sync_rate_limit_per_window)
    }

    fn new(window: Duration, limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, endpoint: SyncEndpoint, user_id: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        if guard.len() > SWEEP_THRESHOLD {
            let window = self.window;
            guard.retain(|_, entry| now.duration_since(entry.started_at) < window);
        }

        let entry = guard
            .entry((endpoint, user_id.to_string()))
            .or_insert(RateWindow {
                started_at: now,
                count: 0,
            });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs();
            self.metrics.limited[endpoint.slot()].fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = endpoint.label(),
                user = user_fingerprint(user_id),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                "Too many sync requests, please try again later",
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.metrics.allowed[endpoint.slot()].fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        let allowed = |endpoint: SyncEndpoint| {
            self.metrics.allowed[endpoint.slot()].load(Ordering::Relaxed)
        };
        let limited = |endpoint: SyncEndpoint| {
            self.metrics.limited[endpoint.slot()].load(Ordering::Relaxed)
        };
        RateLimitMetricsSnapshot {
            push_allowed: allowed(SyncEndpoint::Push),
            push_limited: limited(SyncEndpoint::Push),
            pull_allowed: allowed(SyncEndpoint::Pull),
            pull_limited: limited(SyncEndpoint::Pull),
            resolve_allowed: allowed(SyncEndpoint::Resolve),
            resolve_limited: limited(SyncEndpoint::Resolve),
        }
    }
}

impl SyncEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Push => "sync_push",
            Self::Pull => "sync_pull",
            Self::Resolve => "sync_resolve",
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::Push => 0,
            Self::Pull => 1,
            Self::Resolve => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 2);

        limiter.check(SyncEndpoint::Push, "user-a").await.unwrap();
        limiter.check(SyncEndpoint::Push, "user-a").await.unwrap();

        let err = limiter
            .check(SyncEndpoint::Push, "user-a")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_, secs) if secs <= 60));

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.push_allowed, 2);
        assert_eq!(metrics.push_limited, 1);
    }

    #[tokio::test]
    async fn rate_limiter_counts_endpoints_and_users_separately() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 1);

        limiter.check(SyncEndpoint::Push, "user-a").await.unwrap();
        limiter.check(SyncEndpoint::Pull, "user-a").await.unwrap();
        limiter.check(SyncEndpoint::Push, "user-b").await.unwrap();
        assert!(limiter.check(SyncEndpoint::Pull, "user-a").await.is_err());

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.push_allowed, 2);
        assert_eq!(metrics.pull_allowed, 1);
        assert_eq!(metrics.pull_limited, 1);
        assert_eq!(metrics.resolve_allowed, 0);
    }

    #[tokio::test]
    async fn rate_limiter_resets_after_window() {
        let limiter = EndpointRateLimiter::new(Duration::from_millis(20), 1);
        limiter.check(SyncEndpoint::Resolve, "user-a").await.unwrap();
        assert!(limiter.check(SyncEndpoint::Resolve, "user-a").await.is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.check(SyncEndpoint::Resolve, "user-a").await.unwrap();
    }
}
