pub mod analytics;
pub mod event;
pub mod writer;

pub use analytics::{
    AnalyticsEngine, AnalyticsError, CohortWindow, DauRow, RetentionResult, TopEventRow, WindowKind,
};
pub use event::{Event, StoredEvent};
pub use writer::{EventStore, InsertOutcome, StoreError};
