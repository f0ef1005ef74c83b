use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("from date {from} is after to date {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
    #[error("limit must be between 1 and 100")]
    InvalidLimit,
    #[error("windows must be between 1 and 10")]
    InvalidWindowCount,
    #[error("window_type must be 'daily' or 'weekly'")]
    InvalidWindowKind,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DauRow {
    pub date: NaiveDate,
    pub active_users: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TopEventRow {
    pub event_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Daily,
    Weekly,
}

impl WindowKind {
    fn days(self) -> i64 {
        match self {
            WindowKind::Daily => 1,
            WindowKind::Weekly => 7,
        }
    }
}

impl std::str::FromStr for WindowKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(WindowKind::Daily),
            "weekly" => Ok(WindowKind::Weekly),
            _ => Err(AnalyticsError::InvalidWindowKind),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CohortWindow {
    pub window: u32,
    pub count: i64,
    pub retention_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetentionResult {
    pub cohort_start: NaiveDate,
    pub cohort_size: i64,
    pub windows: Vec<CohortWindow>,
}

/// Analytics queries over the durable event store. Calendar-date grouping is
/// always anchored to UTC (`AT TIME ZONE 'UTC'`), independent of the
/// connection's session timezone.
#[derive(Clone)]
pub struct AnalyticsEngine {
    pool: PgPool,
}

impl AnalyticsEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), AnalyticsError> {
        if from > to {
            return Err(AnalyticsError::InvalidRange { from, to });
        }
        Ok(())
    }

    pub async fn dau(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DauRow>, AnalyticsError> {
        Self::validate_range(from, to)?;
        let to_exclusive = to + chrono::Duration::days(1);

        let rows = sqlx::query_as::<_, DauRow>(
            r#"
            SELECT
                (occurred_at AT TIME ZONE 'UTC')::date AS date,
                COUNT(DISTINCT user_id) AS active_users
            FROM events
            WHERE occurred_at >= $1 AND occurred_at < $2
            GROUP BY date
            ORDER BY date ASC
            "#,
        )
        .bind(from)
        .bind(to_exclusive)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn top_events(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        limit: i64,
    ) -> Result<Vec<TopEventRow>, AnalyticsError> {
        Self::validate_range(from, to)?;
        if !(1..=100).contains(&limit) {
            return Err(AnalyticsError::InvalidLimit);
        }
        let to_exclusive = to + chrono::Duration::days(1);

        let rows = sqlx::query_as::<_, TopEventRow>(
            r#"
            SELECT event_type, COUNT(*) AS count
            FROM events
            WHERE occurred_at >= $1 AND occurred_at < $2
            GROUP BY event_type
            ORDER BY count DESC
            LIMIT $3
            "#,
        )
        .bind(from)
        .bind(to_exclusive)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn retention(
        &self,
        cohort_start: NaiveDate,
        windows: u32,
        window_kind: WindowKind,
    ) -> Result<RetentionResult, AnalyticsError> {
        if !(1..=10).contains(&windows) {
            return Err(AnalyticsError::InvalidWindowCount);
        }

        let cohort_users: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT user_id
            FROM events
            WHERE (occurred_at AT TIME ZONE 'UTC')::date = $1
            "#,
        )
        .bind(cohort_start)
        .fetch_all(&self.pool)
        .await?;

        let cohort_size = cohort_users.len() as i64;
        if cohort_size == 0 {
            return Ok(RetentionResult {
                cohort_start,
                cohort_size: 0,
                windows: Vec::new(),
            });
        }

        let mut result_windows = Vec::with_capacity(windows as usize);
        for k in 1..=windows {
            let window_date = cohort_start + chrono::Duration::days(window_kind.days() * k as i64);

            let (retained,): (i64,) = sqlx::query_as(
                r#"
                SELECT COUNT(DISTINCT user_id)
                FROM events
                WHERE (occurred_at AT TIME ZONE 'UTC')::date = $1
                  AND user_id = ANY($2)
                "#,
            )
            .bind(window_date)
            .bind(&cohort_users)
            .fetch_one(&self.pool)
            .await?;

            let retention_rate = (retained as f64 / cohort_size as f64 * 100.0 * 100.0).round() / 100.0;

            result_windows.push(CohortWindow {
                window: k,
                count: retained,
                retention_rate,
            });
        }

        Ok(RetentionResult {
            cohort_start,
            cohort_size,
            windows: result_windows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;
    use uuid::Uuid;

    async fn seed(pool: &PgPool, user_id: &str, event_type: &str, date: NaiveDate) {
        sqlx::query(
            r#"
            INSERT INTO events (event_id, user_id, event_type, occurred_at, properties)
            VALUES ($1, $2, $3, $4, '{}')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(event_type)
        .bind(date.and_hms_opt(12, 0, 0).unwrap().and_utc())
        .execute(pool)
        .await
        .unwrap();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn dau_counts_distinct_users_per_day(pool: PgPool) {
        let day1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        seed(&pool, "user_A", "click", day1).await;
        seed(&pool, "user_B", "click", day1).await;
        seed(&pool, "user_A", "click", day2).await;

        let engine = AnalyticsEngine::new(pool);
        let rows = engine.dau(day1, day2).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, day1);
        assert_eq!(rows[0].active_users, 2);
        assert_eq!(rows[1].date, day2);
        assert_eq!(rows[1].active_users, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn dau_rejects_inverted_range(pool: PgPool) {
        let engine = AnalyticsEngine::new(pool);
        let from = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let err = engine.dau(from, to).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRange { .. }));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn top_events_orders_by_count_descending(pool: PgPool) {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        seed(&pool, "user_A", "page_view", day).await;
        seed(&pool, "user_B", "page_view", day).await;
        seed(&pool, "user_A", "click", day).await;

        let engine = AnalyticsEngine::new(pool);
        let rows = engine.top_events(day, day, 10).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event_type, "page_view");
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[1].event_type, "click");
        assert_eq!(rows[1].count, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn retention_tracks_cohort_across_windows(pool: PgPool) {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let d1 = d0 + chrono::Duration::days(1);
        seed(&pool, "u1", "click", d0).await;
        seed(&pool, "u2", "click", d0).await;
        seed(&pool, "u1", "click", d1).await;
        // no one active on d0 + 2

        let engine = AnalyticsEngine::new(pool);
        let result = engine.retention(d0, 2, WindowKind::Daily).await.unwrap();

        assert_eq!(result.cohort_start, d0);
        assert_eq!(result.cohort_size, 2);
        assert_eq!(result.windows.len(), 2);
        assert_eq!(result.windows[0].window, 1);
        assert_eq!(result.windows[0].count, 1);
        assert_eq!(result.windows[0].retention_rate, 50.0);
        assert_eq!(result.windows[1].window, 2);
        assert_eq!(result.windows[1].count, 0);
        assert_eq!(result.windows[1].retention_rate, 0.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn retention_of_empty_cohort_is_empty(pool: PgPool) {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let engine = AnalyticsEngine::new(pool);
        let result = engine.retention(d0, 2, WindowKind::Daily).await.unwrap();

        assert_eq!(result.cohort_size, 0);
        assert!(result.windows.is_empty());
    }
}
