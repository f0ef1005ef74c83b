use std::sync::Arc;

use async_trait::async_trait;
use common_redis::{Client, CustomRedisError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit backend error: {0}")]
    Backend(#[from] CustomRedisError),
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub remaining: u64,
}

fn counter_key(client_id: &str) -> String {
    format!("rate_limit:{client_id}")
}

/// Request counter with a TTL re-armed on every call: the counter keeps
/// resetting as long as requests keep arriving within `window_seconds` of
/// each other, and only expires (back to zero) once the client goes quiet
/// for a full window.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, client_id: &str) -> Result<RateLimitOutcome, RateLimitError>;
}

pub struct RedisRateLimiter<C: Client> {
    client: Arc<C>,
    enabled: bool,
    max_requests: u64,
    window_seconds: i64,
}

impl<C: Client> RedisRateLimiter<C> {
    pub fn new(client: Arc<C>, enabled: bool, max_requests: u64, window_seconds: i64) -> Self {
        Self {
            client,
            enabled,
            max_requests,
            window_seconds,
        }
    }
}

#[async_trait]
impl<C: Client + Send + Sync> RateLimiter for RedisRateLimiter<C> {
    async fn check(&self, client_id: &str) -> Result<RateLimitOutcome, RateLimitError> {
        if !self.enabled {
            return Ok(RateLimitOutcome {
                allowed: true,
                remaining: self.max_requests,
            });
        }

        let key = counter_key(client_id);
        let count = self.client.incr(key.clone()).await?;
        self.client.expire(key, self.window_seconds).await?;

        let count = count.max(0) as u64;
        let remaining = self.max_requests.saturating_sub(count);
        Ok(RateLimitOutcome {
            allowed: count <= self.max_requests,
            remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_redis::MockRedisClient;

    #[tokio::test]
    async fn disabled_limiter_always_allows() {
        let mock = MockRedisClient::new();
        let limiter = RedisRateLimiter::new(Arc::new(mock), false, 5, 60);
        let outcome = limiter.check("1.2.3.4").await.unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.remaining, 5);
    }

    #[tokio::test]
    async fn exceeding_max_requests_is_denied() {
        let mock = MockRedisClient::new().with_counter(&counter_key("1.2.3.4"), 5);
        let limiter = RedisRateLimiter::new(Arc::new(mock), true, 5, 60);
        let outcome = limiter.check("1.2.3.4").await.unwrap();
        assert!(!outcome.allowed);
        assert_eq!(outcome.remaining, 0);
    }
}
