//! Wall-clock seam.
//!
//! Run records are stamped when a run starts and when it is finalized. The
//! engine reads both through `Clock` so tests can pin or advance time.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of wall-clock time for run records.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Wall-clock time since `start`; zero if `start` is in the future.
    fn elapsed_since(&self, start: DateTime<Utc>) -> Duration {
        (self.now() - start).to_std().unwrap_or_default()
    }
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
