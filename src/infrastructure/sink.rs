//! Event sink adapters.

use crate::application::ports::EventSink;
use crate::domain::event::GuardEvent;
use tracing::warn;

/// Sink that forwards every notification as a `warn!` event.
///
/// Used when the host does not provide its own audit sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn notify(&self, event: &GuardEvent) {
        warn!(
            kind = %event.kind,
            rule_id = %event.rule_id,
            resource_id = %event.resource_id,
            rejection_rate = event.rejection_rate,
            "rate limit event"
        );
    }
}

/// Sink that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn notify(&self, _event: &GuardEvent) {}
}
