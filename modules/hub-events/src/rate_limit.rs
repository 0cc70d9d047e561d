//! Fixed-window rate limiter (C13) backing the public feed endpoint's
//! per-token bucket (spec.md §6.3). Grounded on
//! `original_source/app/services/rate_limit.py`'s `TokenRateLimiter`
//! (INCR + EXPIRE against a window-keyed counter); moved here off Postgres
//! and onto `redis` because a rate limiter that serializes through row locks
//! on the same pool the dispatcher claims work from just buys contention —
//! `redis` is the enrichment the pack's own manifests reach for here.

use redis::AsyncCommands;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_seconds: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    client: redis::Client,
}

impl RateLimiter {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }

    /// Allow or reject one unit of work against `key` within the current
    /// fixed window. `bucket` is the caller-chosen prefix (e.g.
    /// `feed:<hash(token)>`) so distinct surfaces never share a counter.
    pub async fn allow(
        &self,
        bucket: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<RateLimitResult, redis::RedisError> {
        let mut conn = self.client.get_connection_manager().await?;
        let window = now_unix() / window_seconds;
        let redis_key = format!("ratelimit:{bucket}:{window}");

        let count: u64 = conn.incr(&redis_key, 1u64).await?;
        if count == 1 {
            // Only the caller that creates the counter sets its expiry, so a
            // clock-racing second caller doesn't reset the TTL mid-window.
            let _: () = conn.expire(&redis_key, window_seconds as i64).await?;
        }

        let reset_seconds = window_seconds - (now_unix() % window_seconds);
        if count as u32 > limit {
            Ok(RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_seconds,
            })
        } else {
            Ok(RateLimitResult {
                allowed: true,
                remaining: limit - count as u32,
                reset_seconds,
            })
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}
