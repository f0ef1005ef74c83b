use sqlx::PgPool;
use thiserror::Error;

use crate::event::Event;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Transient failures are the ones worth retrying (connection blips,
    /// serialization failures, deadlocks); anything else is treated as
    /// permanent by callers.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(e) => common_database::is_transient_error(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub duplicate: u64,
}

/// Durable event store writer. A thin wrapper over a `PgPool` — pool sizing,
/// acquire timeout, and pre-ping are the pool's own responsibility (see
/// `EventStore::connect`), not this type's.
#[derive(Clone)]
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = common_database::get_pool_with_config(
            database_url,
            common_database::PoolConfig {
                max_connections,
                acquire_timeout: std::time::Duration::from_secs(10),
                idle_timeout: Some(std::time::Duration::from_secs(300)),
                max_lifetime: Some(std::time::Duration::from_secs(1800)),
                test_before_acquire: true,
            },
        )
        .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::from(e)))?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts every event in `events` inside a single transaction. Each
    /// insert races the `event_id` uniqueness constraint: a collision is not
    /// an error, it's a duplicate. The transaction commits once at the end;
    /// any driver-level error rolls the whole batch back and propagates.
    pub async fn insert(&self, events: &[Event]) -> Result<InsertOutcome, StoreError> {
        let mut outcome = InsertOutcome::default();
        let mut tx = self.pool.begin().await?;

        for event in events {
            let result = sqlx::query(
                r#"
                INSERT INTO events (event_id, user_id, event_type, occurred_at, properties)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (event_id) DO NOTHING
                "#,
            )
            .bind(event.event_id)
            .bind(&event.user_id)
            .bind(&event.event_type)
            .bind(event.occurred_at)
            .bind(&event.properties)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                outcome.inserted += 1;
            } else {
                outcome.duplicate += 1;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Idempotent single-event insert used by the queue consumer: redelivery
    /// of the same message must not double-count, so this is just `insert`
    /// with one event, exposed under a name that reads naturally at the call
    /// site.
    pub async fn insert_one(&self, event: &Event) -> Result<InsertOutcome, StoreError> {
        self.insert(std::slice::from_ref(event)).await
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::PgPool;
    use uuid::Uuid;

    fn sample_event() -> Event {
        Event {
            event_id: Uuid::new_v4(),
            user_id: "user_A".to_string(),
            event_type: "click".to_string(),
            occurred_at: Utc::now(),
            properties: serde_json::json!({"button": "submit"}),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn insert_one_persists_and_counts(pool: PgPool) {
        let store = EventStore::new(pool);
        let event = sample_event();

        let outcome = store.insert_one(&event).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicate, 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn redelivered_event_id_is_a_duplicate_not_an_error(pool: PgPool) {
        let store = EventStore::new(pool);
        let event = sample_event();

        store.insert_one(&event).await.unwrap();
        let outcome = store.insert_one(&event).await.unwrap();

        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.duplicate, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn insert_batch_tracks_inserted_and_duplicate_separately(pool: PgPool) {
        let store = EventStore::new(pool);
        let first = sample_event();
        let mut second = sample_event();
        second.event_id = first.event_id;
        let third = sample_event();

        let outcome = store.insert(&[first, second, third]).await.unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.duplicate, 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
