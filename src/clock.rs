//! Injectable time source.
//!
//! Cache freshness is judged against wall-clock time that must be
//! controllable in tests, so the cache takes a `Clock` instead of calling
//! `SystemTime::now()` directly.

use std::time::SystemTime;

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
