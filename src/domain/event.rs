//! Notifications handed to the host's audit/error sink.

use std::fmt;

/// Why a notification was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardEventKind {
    /// A bucket rejected a request
    RateLimited,
    /// An open circuit rejected a request
    CircuitRejected,
    /// A rule's circuit breaker transitioned to open
    CircuitOpened,
}

impl fmt::Display for GuardEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardEventKind::RateLimited => f.write_str("rate_limited"),
            GuardEventKind::CircuitRejected => f.write_str("circuit_rejected"),
            GuardEventKind::CircuitOpened => f.write_str("circuit_opened"),
        }
    }
}

/// A rejection or breaker transition, as reported to an [`EventSink`](crate::EventSink).
#[derive(Debug, Clone, PartialEq)]
pub struct GuardEvent {
    /// What happened
    pub kind: GuardEventKind,
    /// Rule that produced the decision
    pub rule_id: String,
    /// Resource the request targeted
    pub resource_id: String,
    /// Rejection rate of the bucket involved (0.0 to 1.0), 0.0 if none
    pub rejection_rate: f64,
}

impl GuardEvent {
    /// Create an event.
    pub fn new(
        kind: GuardEventKind,
        rule_id: impl Into<String>,
        resource_id: impl Into<String>,
        rejection_rate: f64,
    ) -> Self {
        Self {
            kind,
            rule_id: rule_id.into(),
            resource_id: resource_id.into(),
            rejection_rate,
        }
    }
}
