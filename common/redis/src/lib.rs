pub mod mock;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

pub use mock::MockRedisClient;

const DEFAULT_REDIS_TIMEOUT_MILLISECS: u64 = 100;

fn get_redis_timeout_ms() -> u64 {
    std::env::var("REDIS_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_REDIS_TIMEOUT_MILLISECS)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustomRedisError {
    #[error("Redis error: {0}")]
    Other(String),
    #[error("Timeout error")]
    Timeout,
}

impl From<RedisError> for CustomRedisError {
    fn from(err: RedisError) -> Self {
        CustomRedisError::Other(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CustomRedisError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CustomRedisError::Timeout
    }
}

/// Narrow capability contract over the Redis operations the dedup cache and
/// rate limiter actually need. Swappable for `MockRedisClient` in tests.
#[async_trait]
pub trait Client {
    async fn exists(&self, k: String) -> Result<bool, CustomRedisError>;

    /// `SET key value EX seconds NX`. Returns true if the key was set (i.e. it was
    /// absent), false if it already existed.
    async fn set_nx_ex(&self, k: String, v: String, seconds: u64)
        -> Result<bool, CustomRedisError>;

    /// Atomically increments the counter at `k` and returns the new value.
    async fn incr(&self, k: String) -> Result<i64, CustomRedisError>;

    async fn expire(&self, k: String, seconds: i64) -> Result<(), CustomRedisError>;

    /// Pipelined existence check, one round trip for the whole batch.
    async fn exists_batch(&self, ks: Vec<String>) -> Result<Vec<bool>, CustomRedisError>;

    /// Pipelined conditional set-if-absent, one round trip for the whole batch.
    async fn set_nx_ex_batch(
        &self,
        entries: Vec<(String, String)>,
        seconds: u64,
    ) -> Result<(), CustomRedisError>;
}

pub struct RedisClient {
    connection: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(RedisClient { connection })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn exists(&self, k: String) -> Result<bool, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.exists(k);
        let fut: Result<bool, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn set_nx_ex(
        &self,
        k: String,
        v: String,
        seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        let mut conn = self.connection.clone();
        let result: Result<Option<String>, RedisError> = timeout(
            Duration::from_millis(get_redis_timeout_ms()),
            redis::cmd("SET")
                .arg(&k)
                .arg(&v)
                .arg("EX")
                .arg(seconds)
                .arg("NX")
                .query_async(&mut conn),
        )
        .await?;

        match result {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(CustomRedisError::Other(e.to_string())),
        }
    }

    async fn incr(&self, k: String) -> Result<i64, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.incr(k, 1);
        let fut: Result<i64, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn expire(&self, k: String, seconds: i64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.expire(k, seconds);
        let fut: Result<(), RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn exists_batch(&self, ks: Vec<String>) -> Result<Vec<bool>, CustomRedisError> {
        if ks.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        for k in &ks {
            pipe.exists(k);
        }
        let results: Vec<bool> = timeout(
            Duration::from_millis(get_redis_timeout_ms()),
            pipe.query_async(&mut conn),
        )
        .await??;
        Ok(results)
    }

    async fn set_nx_ex_batch(
        &self,
        entries: Vec<(String, String)>,
        seconds: u64,
    ) -> Result<(), CustomRedisError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        for (k, v) in &entries {
            pipe.cmd("SET").arg(k).arg(v).arg("EX").arg(seconds).arg("NX");
        }
        // Results are irrelevant: mark_batch_seen's postcondition is "the key exists",
        // not "we were the one who set it".
        let _values: Vec<redis::Value> = timeout(
            Duration::from_millis(get_redis_timeout_ms()),
            pipe.query_async(&mut conn),
        )
        .await??;
        Ok(())
    }
}
