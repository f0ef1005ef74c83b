use chrono::{DateTime, Utc};

/// A mockable source of "now", following this codebase's convention of
/// threading the clock through as a trait object rather than calling
/// `Utc::now()` at the point of use.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
