//! Event sink that records what it receives.

use crate::application::ports::EventSink;
use crate::domain::event::{GuardEvent, GuardEventKind};
use std::sync::{Arc, Mutex};

/// Sink that keeps every notification for later assertions.
///
/// Clones share one buffer.
///
/// # Examples
///
/// ```
/// use resource_throttle::infrastructure::mocks::RecordingSink;
/// use resource_throttle::{EventSink, GuardEvent, GuardEventKind};
///
/// let sink = RecordingSink::new();
/// sink.notify(&GuardEvent::new(GuardEventKind::RateLimited, "r1", "api", 0.5));
///
/// assert_eq!(sink.count(), 1);
/// assert_eq!(sink.count_kind(GuardEventKind::CircuitOpened), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<GuardEvent>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events.
    pub fn events(&self) -> Vec<GuardEvent> {
        self.events
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .clone()
    }

    /// Get the number of recorded events.
    pub fn count(&self) -> usize {
        self.events
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .len()
    }

    /// Get the number of recorded events of one kind.
    pub fn count_kind(&self, kind: GuardEventKind) -> usize {
        self.events
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }

    /// Forget all recorded events.
    pub fn clear(&self) {
        self.events
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .clear();
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, event: &GuardEvent) {
        self.events
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .push(event.clone());
    }
}
