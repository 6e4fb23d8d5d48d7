//! Time source for the runner, injectable so tests can script elapsed time.

use chrono::{DateTime, Utc};

/// Reads the current time. Handlers call it at the moment they observe or
/// decide something, so long provider calls are reflected in the stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
