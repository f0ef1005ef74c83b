use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_client_ip::InsecureClientIp;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{BatchResponse, EventCountResponse, IngestError};
use crate::dedup::DedupCache;
use crate::queue::QueuePublisher;
use crate::rate_limit::RateLimiter;
use crate::time::TimeSource;
use crate::validation::{self, IngestBatch};
use store::{AnalyticsEngine, EventStore, RetentionResult, WindowKind};

#[derive(Clone)]
pub struct AppState {
    pub dedup: Arc<dyn DedupCache>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub queue: Arc<dyn QueuePublisher>,
    pub store: Arc<EventStore>,
    pub analytics: Arc<AnalyticsEngine>,
    pub time_source: Arc<dyn TimeSource>,
}

/// Accepts a batch of events: validate, dedup-check, publish each survivor
/// to the queue, mark the batch seen. If publishing any event fails midway,
/// the ones already published are reported accepted and the rest are
/// reported failed, rather than rolling the whole batch back or silently
/// reporting `failed: 0` on a partial outcome.
pub async fn ingest_events(
    State(state): State<AppState>,
    InsecureClientIp(ip): InsecureClientIp,
    Json(batch): Json<IngestBatch>,
) -> Result<Response, IngestError> {
    let outcome = state.rate_limiter.check(&ip.to_string()).await?;
    if !outcome.allowed {
        metrics::counter!("rate_limit_exceeded_total").increment(1);
        return Err(IngestError::RateLimited { remaining: outcome.remaining });
    }

    metrics::counter!("events_received_total").increment(1);
    let start = std::time::Instant::now();

    let events = match validation::validate_batch(batch, state.time_source.as_ref()) {
        Ok(events) => events,
        Err(e) => {
            metrics::counter!("events_failed_total", "reason" => "validation").increment(1);
            return Err(e.into());
        }
    };
    let ids: Vec<Uuid> = events.iter().map(|e| e.event_id).collect();
    let (new_ids, duplicate_ids) = state.dedup.check_batch(&ids).await?;
    metrics::counter!("events_duplicate_total").increment(duplicate_ids.len() as u64);

    let new_events: Vec<_> = events
        .into_iter()
        .filter(|e| new_ids.contains(&e.event_id))
        .collect();

    // A publisher error aborts the remaining batch: everything from the
    // first failure onward is reported failed rather than attempted.
    let mut published = Vec::with_capacity(new_events.len());
    let mut failed = 0usize;
    for event in &new_events {
        match state.queue.publish(event).await {
            Ok(()) => published.push(event.event_id),
            Err(_) => {
                failed = new_events.len() - published.len();
                break;
            }
        }
    }
    if failed > 0 {
        metrics::counter!("events_failed_total", "reason" => "publish").increment(failed as u64);
    }
    metrics::counter!("events_ingested_total").increment(published.len() as u64);

    if !published.is_empty() {
        state.dedup.mark_batch_seen(&published).await?;
    }

    let mut response = BatchResponse {
        accepted: published.len(),
        duplicates: duplicate_ids.len(),
        failed,
        message: "batch processed".to_string(),
    }
    .into_response();

    if let Ok(value) = HeaderValue::from_str(&outcome.remaining.to_string()) {
        response.headers_mut().insert("X-RateLimit-Remaining", value);
    }

    metrics::histogram!("ingestion_duration_seconds").record(start.elapsed().as_secs_f64());
    Ok(response)
}

pub async fn event_count(
    State(state): State<AppState>,
) -> Result<Json<EventCountResponse>, IngestError> {
    let total_events = state.store.count().await?;
    Ok(Json(EventCountResponse { total_events }))
}

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

pub async fn dau(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Vec<store::DauRow>>, IngestError> {
    let rows = state.analytics.dau(range.from, range.to).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct TopEventsQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default = "default_top_events_limit")]
    pub limit: i64,
}

fn default_top_events_limit() -> i64 {
    10
}

pub async fn top_events(
    State(state): State<AppState>,
    Query(query): Query<TopEventsQuery>,
) -> Result<Json<Vec<store::TopEventRow>>, IngestError> {
    let rows = state
        .analytics
        .top_events(query.from, query.to, query.limit)
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct RetentionQuery {
    pub start_date: NaiveDate,
    #[serde(default = "default_retention_windows")]
    pub windows: u32,
    #[serde(default = "default_window_kind")]
    pub window_type: String,
}

fn default_retention_windows() -> u32 {
    3
}

fn default_window_kind() -> String {
    "daily".to_string()
}

#[derive(Debug, Serialize)]
pub struct RetentionResponse {
    pub cohorts: Vec<RetentionResult>,
    pub window_type: String,
}

pub async fn retention(
    State(state): State<AppState>,
    Query(query): Query<RetentionQuery>,
) -> Result<Json<RetentionResponse>, IngestError> {
    let window_kind: WindowKind = query.window_type.parse().map_err(IngestError::from)?;
    let result = state
        .analytics
        .retention(query.start_date, query.windows, window_kind)
        .await?;
    Ok(Json(RetentionResponse {
        cohorts: vec![result],
        window_type: query.window_type,
    }))
}
