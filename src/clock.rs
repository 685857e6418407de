//! Monotonic clock abstraction.
//!
//! Everything that measures elapsed time (bucket refill, metric windows)
//! takes an `Arc<dyn Clock>` instead of calling `Instant::now()` directly,
//! so tests can drive time by hand instead of sleeping.

use std::time::Instant;

/// Source of monotonic timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock backed by `Instant::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Test clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
    now: parking_lot::Mutex<Instant>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, delta: std::time::Duration) {
        *self.now.lock() += delta;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
