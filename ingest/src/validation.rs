use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::time::TimeSource;
use store::Event;

pub const MAX_BATCH_SIZE: usize = 1000;
const MAX_USER_ID_LEN: usize = 255;
const MAX_EVENT_TYPE_LEN: usize = 100;

/// Wire shape of a single event in an incoming batch, before it is known to
/// be well-formed enough to become a `store::Event`.
#[derive(Debug, Deserialize)]
pub struct RawEvent {
    pub event_id: Uuid,
    pub user_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct IngestBatch {
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("batch must not be empty")]
    EmptyBatch,
    #[error("batch of {0} events exceeds the maximum of {MAX_BATCH_SIZE}")]
    BatchTooLarge(usize),
    #[error("event at index {index}: user_id must be between 1 and {MAX_USER_ID_LEN} characters")]
    InvalidUserId { index: usize },
    #[error("event at index {index}: event_type must be between 1 and {MAX_EVENT_TYPE_LEN} characters")]
    InvalidEventType { index: usize },
    #[error("event at index {index}: occurred_at is in the future")]
    OccurredAtInFuture { index: usize },
}

/// Validates and converts a raw batch into store-ready events, per
/// the source's validation rules. The batch-level checks (non-empty,
/// within the size cap) run before any per-event check; per-event checks
/// run in index order and fail on the first offender, identifying its
/// position so the client can locate it in the request body it sent.
pub fn validate_batch(
    batch: IngestBatch,
    time_source: &dyn TimeSource,
) -> Result<Vec<Event>, ValidationError> {
    if batch.events.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    if batch.events.len() > MAX_BATCH_SIZE {
        return Err(ValidationError::BatchTooLarge(batch.events.len()));
    }

    let now = time_source.now();
    let mut events = Vec::with_capacity(batch.events.len());

    for (index, raw) in batch.events.into_iter().enumerate() {
        if raw.user_id.is_empty() || raw.user_id.len() > MAX_USER_ID_LEN {
            return Err(ValidationError::InvalidUserId { index });
        }
        if raw.event_type.is_empty() || raw.event_type.len() > MAX_EVENT_TYPE_LEN {
            return Err(ValidationError::InvalidEventType { index });
        }
        if raw.occurred_at > now {
            return Err(ValidationError::OccurredAtInFuture { index });
        }

        events.push(Event {
            event_id: raw.event_id,
            user_id: raw.user_id,
            event_type: raw.event_type,
            occurred_at: raw.occurred_at,
            properties: raw.properties.unwrap_or_else(|| serde_json::json!({})),
        });
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FixedTime(DateTime<Utc>);
    impl TimeSource for FixedTime {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn raw(user_id: &str, event_type: &str, occurred_at: DateTime<Utc>) -> RawEvent {
        RawEvent {
            event_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            event_type: event_type.to_string(),
            occurred_at,
            properties: None,
        }
    }

    #[test]
    fn rejects_empty_batch() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = validate_batch(IngestBatch { events: vec![] }, &FixedTime(now)).unwrap_err();
        assert_eq!(err, ValidationError::EmptyBatch);
    }

    #[test]
    fn rejects_batch_over_max_size() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let events = (0..MAX_BATCH_SIZE + 1)
            .map(|_| raw("u1", "click", now))
            .collect();
        let err = validate_batch(IngestBatch { events }, &FixedTime(now)).unwrap_err();
        assert_eq!(err, ValidationError::BatchTooLarge(MAX_BATCH_SIZE + 1));
    }

    #[test]
    fn rejects_future_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let future = now + chrono::Duration::days(1);
        let err = validate_batch(IngestBatch { events: vec![raw("u1", "click", future)] }, &FixedTime(now))
            .unwrap_err();
        assert_eq!(err, ValidationError::OccurredAtInFuture { index: 0 });
    }

    #[test]
    fn accepts_well_formed_batch() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let events = validate_batch(
            IngestBatch { events: vec![raw("u1", "click", now)] },
            &FixedTime(now),
        )
        .unwrap();
        assert_eq!(events.len(), 1);
    }
}
