use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A single user-activity record, as accepted by the ingest handler and as
/// carried across the work queue to the store writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: Uuid,
    pub user_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default = "empty_properties")]
    pub properties: JsonValue,
}

fn empty_properties() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}

/// A row as it exists in the durable store, with storage-assigned fields.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredEvent {
    pub id: i64,
    pub event_id: Uuid,
    pub user_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub properties: JsonValue,
    pub created_at: DateTime<Utc>,
}
