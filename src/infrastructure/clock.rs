//! Clock adapters.
//!
//! `SystemClock` is the production clock. Tests drive time with `MockClock`
//! (in `crate::infrastructure::mocks`), available in test builds and with the
//! `test-helpers` feature.

use crate::application::ports::Clock;
use std::time::Instant;

/// Monotonic clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
