use std::sync::Arc;

use async_trait::async_trait;
use common_redis::{Client, CustomRedisError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("cache error: {0}")]
    Cache(#[from] CustomRedisError),
}

fn seen_key(id: Uuid) -> String {
    format!("event:seen:{id}")
}

/// Fast seen/unseen lookup and marking against the dedup cache. The cache is
/// a hint, not truth: it may report false negatives for an expired or
/// never-marked id, but it must never report a false positive for an id it
/// has never been asked to mark. The store's uniqueness constraint is the
/// authoritative source (see `store::EventStore::insert`).
#[async_trait]
pub trait DedupCache: Send + Sync {
    async fn check_batch(&self, ids: &[Uuid]) -> Result<(Vec<Uuid>, Vec<Uuid>), DedupError>;
    async fn mark_batch_seen(&self, ids: &[Uuid]) -> Result<(), DedupError>;
}

pub struct RedisDedupCache<C: Client> {
    client: Arc<C>,
    ttl_seconds: u64,
}

impl<C: Client> RedisDedupCache<C> {
    pub fn new(client: Arc<C>, ttl_seconds: u64) -> Self {
        Self { client, ttl_seconds }
    }
}

#[async_trait]
impl<C: Client + Send + Sync> DedupCache for RedisDedupCache<C> {
    async fn check_batch(&self, ids: &[Uuid]) -> Result<(Vec<Uuid>, Vec<Uuid>), DedupError> {
        if ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let keys: Vec<String> = ids.iter().copied().map(seen_key).collect();
        let present = self.client.exists_batch(keys).await?;

        let mut new_ids = Vec::new();
        let mut duplicate_ids = Vec::new();
        for (id, is_present) in ids.iter().zip(present) {
            if is_present {
                duplicate_ids.push(*id);
            } else {
                new_ids.push(*id);
            }
        }

        Ok((new_ids, duplicate_ids))
    }

    async fn mark_batch_seen(&self, ids: &[Uuid]) -> Result<(), DedupError> {
        if ids.is_empty() {
            return Ok(());
        }

        let entries: Vec<(String, String)> = ids
            .iter()
            .copied()
            .map(|id| (seen_key(id), "1".to_string()))
            .collect();

        self.client.set_nx_ex_batch(entries, self.ttl_seconds).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_redis::MockRedisClient;

    #[tokio::test]
    async fn check_batch_partitions_new_and_duplicate() {
        let seen = Uuid::new_v4();
        let new = Uuid::new_v4();
        let mock = MockRedisClient::new().mark_present(&seen_key(seen));
        let cache = RedisDedupCache::new(Arc::new(mock), 86400);

        let (new_ids, duplicate_ids) = cache.check_batch(&[seen, new]).await.unwrap();
        assert_eq!(new_ids, vec![new]);
        assert_eq!(duplicate_ids, vec![seen]);
    }

    #[tokio::test]
    async fn mark_batch_seen_is_noop_for_empty_input() {
        let mock = MockRedisClient::new();
        let cache = RedisDedupCache::new(Arc::new(mock), 86400);
        cache.mark_batch_seen(&[]).await.unwrap();
    }
}
