//! Controllable clock for deterministic tests.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock that only moves when told to.
///
/// All clones share one offset, so a test can hand a clone to the limiter and
/// keep another to advance time.
///
/// # Examples
///
/// ```
/// use resource_throttle::infrastructure::mocks::MockClock;
/// use resource_throttle::application::ports::Clock;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
/// assert_eq!(clock.now(), start);
///
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now(), start + Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a mock clock starting at a specific instant.
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Time elapsed since the starting instant.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clones_share_time() {
        let start = Instant::now();
        let clock = MockClock::new(start);
        let clone = clock.clone();

        let handle = thread::spawn(move || clone.advance(Duration::from_secs(5)));
        handle.join().unwrap();

        assert_eq!(clock.now(), start + Duration::from_secs(5));
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }
}
