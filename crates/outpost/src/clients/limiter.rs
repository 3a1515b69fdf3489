//! Fixed-window rate limiting with Redis backend.

use redis::aio::ConnectionManager;

use questline_common::QuestlineError;
use questline_common::constants::redis_keys;

/// Window length for all limits
const WINDOW_SECS: i64 = 60;

/// Per-client request counter
#[derive(Clone)]
pub struct RateLimiter {
    redis: ConnectionManager,
}

impl RateLimiter {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Count a request from `client` against `scope`.
    ///
    /// Returns the requests remaining in the current minute, or
    /// `RateLimited` once `max_per_minute` is exceeded.
    pub async fn check(
        &self,
        scope: &str,
        client: &str,
        max_per_minute: u32,
    ) -> Result<u32, QuestlineError> {
        let key = limit_key(scope, client);
        let mut conn = self.redis.clone();

        let (count,): (u32,) = count_pipeline(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| QuestlineError::Store(e.to_string()))?;

        verdict(scope, count, max_per_minute)
    }
}

/// Create the window with its TTL if absent, then count the request.
/// One MULTI, so a counter never exists without an expiry.
fn count_pipeline(key: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(WINDOW_SECS)
        .arg("NX")
        .ignore()
        .incr(key, 1);
    pipe
}

fn verdict(scope: &str, count: u32, max_per_minute: u32) -> Result<u32, QuestlineError> {
    remaining(count, max_per_minute).ok_or_else(|| {
        tracing::debug!(scope, count, "Rate limit exceeded");
        QuestlineError::RateLimited("Too many requests. Please wait a moment.".to_string())
    })
}

fn limit_key(scope: &str, client: &str) -> String {
    format!("{}{}:{}", redis_keys::RATELIMIT_PREFIX, scope, client)
}

/// Requests left after the `count`-th, or `None` past the limit
fn remaining(count: u32, max_per_minute: u32) -> Option<u32> {
    max_per_minute.checked_sub(count)
}
