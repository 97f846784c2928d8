//! Circuit breaker policy and state vocabulary.

use std::fmt;
use std::time::Duration;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected until the recovery timeout elapses
    Open,
    /// A limited number of trial requests test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("closed"),
            CircuitState::Open => f.write_str("open"),
            CircuitState::HalfOpen => f.write_str("half_open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before allowing trial requests
    pub recovery_timeout: Duration,
    /// Trial requests allowed, and successes required, while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a config.
    pub fn new(failure_threshold: u32, recovery_timeout: Duration, half_open_max_calls: u32) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            half_open_max_calls,
        }
    }

    /// Check the config invariants.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.failure_threshold == 0 {
            return Err("breaker failure threshold must be at least 1");
        }
        if self.half_open_max_calls == 0 {
            return Err("breaker half-open call limit must be at least 1");
        }
        Ok(())
    }
}

/// A point-in-time snapshot of one circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Failures counted toward the threshold
    pub consecutive_failures: u32,
    /// Trial calls issued in the current half-open period
    pub half_open_calls: u32,
    /// Trial successes observed in the current half-open period
    pub half_open_successes: u32,
    /// Wait until the circuit admits a trial call (zero unless open)
    pub retry_after: Duration,
}
