//! Application state and shared resources.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::clients::RateLimiter;
use crate::config::AppConfig;
use crate::credits::CreditLedger;
use crate::missions::RedisStore;
use questline_common::TotpParams;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Redis connection manager (auto-reconnecting)
    pub redis: ConnectionManager,

    /// TOTP parameters derived from config
    pub totp: TotpParams,

    /// Missions, codes, and completions
    pub store: RedisStore,

    /// Credit balances and transactions
    pub ledger: CreditLedger,

    /// Per-client rate limiter
    pub limiter: RateLimiter,

    /// Process-local counters
    pub stats: Arc<ServiceStats>,
}

impl AppState {
    /// Create new application state, connecting to Redis
    pub async fn new(config: AppConfig) -> Result<Self> {
        // Connect to Redis with connection manager (handles reconnection)
        let client = redis::Client::open(config.redis_url.as_str())
            .context("Failed to create Redis client")?;

        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            totp: config.totp.params(),
            store: RedisStore::new(redis.clone()),
            ledger: CreditLedger::new(redis.clone()),
            limiter: RateLimiter::new(redis.clone()),
            stats: Arc::new(ServiceStats::new()),
            redis,
            config,
        })
    }
}

/// Request counters since process start
#[derive(Debug)]
pub struct ServiceStats {
    started_at: Instant,
    verify_attempts: AtomicU64,
    completions: AtomicU64,
    rejections: AtomicU64,
    live_code_views: AtomicU64,
}

/// Point-in-time copy of `ServiceStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub verify_attempts: u64,
    pub completions: u64,
    pub rejections: u64,
    pub live_code_views: u64,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            verify_attempts: AtomicU64::new(0),
            completions: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            live_code_views: AtomicU64::new(0),
        }
    }

    /// Count one verification attempt and its outcome
    pub fn record_attempt(&self, completed: bool) {
        self.verify_attempts.fetch_add(1, Ordering::Relaxed);
        if completed {
            self.completions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_live_code_view(&self) {
        self.live_code_views.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            verify_attempts: self.verify_attempts.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            live_code_views: self.live_code_views.load(Ordering::Relaxed),
        }
    }
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let stats = ServiceStats::new();
        stats.record_attempt(true);
        stats.record_attempt(false);
        stats.record_attempt(false);
        stats.record_live_code_view();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.verify_attempts, 3);
        assert_eq!(snapshot.completions, 1);
        assert_eq!(snapshot.rejections, 2);
        assert_eq!(snapshot.live_code_views, 1);
    }
}
