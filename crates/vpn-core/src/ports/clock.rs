use chrono::{DateTime, Utc};

/// Injected time source. Production code uses `Utc::now()`; tests pin a
/// fixed or steppable clock so temporal test scenarios (e.g. a one-hour
/// session) don't require a real wall-clock wait.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock, backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
