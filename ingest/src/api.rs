use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedup::DedupError;
use crate::queue::QueueError;
use crate::rate_limit::RateLimitError;
use crate::validation::ValidationError;
use store::{AnalyticsError, StoreError};

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub accepted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub message: String,
}

impl IntoResponse for BatchResponse {
    fn into_response(self) -> Response {
        let status = if self.failed > 0 {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::ACCEPTED
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct EventCountResponse {
    pub total_events: i64,
}

/// Top-level error taxonomy for the ingest binary. Every layer's own error
/// type (dedup cache, queue publisher, store writer, validation) converts
/// into this one at the HTTP edge, mirroring this codebase's pattern of a
/// single response-owning error enum per service rather than threading raw
/// driver errors up to the handler.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("rate limited")]
    RateLimited { remaining: u64 },

    #[error("rate limiter backend error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("dedup cache error: {0}")]
    Dedup(#[from] DedupError),

    #[error("queue publish error: {0}")]
    Queue(#[from] QueueError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}

impl IngestError {
    pub fn to_metric_tag(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation",
            IngestError::RateLimited { .. } => "rate_limited",
            IngestError::RateLimit(_) => "rate_limit_backend",
            IngestError::Dedup(_) => "dedup",
            IngestError::Queue(_) => "queue",
            IngestError::Store(_) => "store",
            IngestError::Analytics(_) => "analytics",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            IngestError::RateLimit(_)
            | IngestError::Dedup(_)
            | IngestError::Queue(_)
            | IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IngestError::Analytics(AnalyticsError::InvalidRange { .. })
            | IngestError::Analytics(AnalyticsError::InvalidLimit)
            | IngestError::Analytics(AnalyticsError::InvalidWindowCount)
            | IngestError::Analytics(AnalyticsError::InvalidWindowKind) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IngestError::Analytics(AnalyticsError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let remaining = match &self {
            IngestError::RateLimited { remaining } => Some(*remaining),
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let Some(remaining) = remaining {
            if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
                response.headers_mut().insert("X-RateLimit-Remaining", value);
            }
        }

        response
    }
}
