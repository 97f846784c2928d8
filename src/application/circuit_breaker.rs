//! Per-rule circuit breaker.
//!
//! Gates whether requests for a rule reach its token buckets at all. A run of
//! rejections opens the circuit; after the recovery timeout a bounded number
//! of trial requests decide whether it closes again.
//!
//! Every transition runs under one mutex per breaker, so concurrent callers
//! always observe a consistent state and trial budget.

use crate::application::ports::Clock;
use crate::domain::breaker::{BreakerStats, CircuitBreakerConfig, CircuitState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct BreakerCore {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
    half_open_successes: u32,
}

impl BreakerCore {
    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.last_failure = Some(now);
        self.half_open_calls = 0;
        self.half_open_successes = 0;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.half_open_calls = 0;
        self.half_open_successes = 0;
    }

    fn retry_after(&self, now: Instant) -> Duration {
        match (self.state, self.last_failure) {
            (CircuitState::Open, Some(last)) => self
                .config
                .recovery_timeout
                .saturating_sub(now.saturating_duration_since(last)),
            _ => Duration::ZERO,
        }
    }
}

/// Circuit breaker guarding one rule.
///
/// # Example
/// ```
/// use resource_throttle::{CircuitBreaker, CircuitBreakerConfig, CircuitState, SystemClock};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let config = CircuitBreakerConfig::new(2, Duration::from_secs(5), 1);
/// let cb = CircuitBreaker::new(config, Arc::new(SystemClock::new()));
///
/// cb.record_failure();
/// assert!(cb.is_allowed());
///
/// cb.record_failure();
/// assert_eq!(cb.state(), CircuitState::Open);
/// assert!(!cb.is_allowed());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    core: Mutex<BreakerCore>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            core: Mutex::new(BreakerCore {
                config,
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                half_open_calls: 0,
                half_open_successes: 0,
            }),
            clock,
        }
    }

    // Every critical section leaves the core valid, so a poisoned lock is
    // still safe to use.
    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current circuit state without triggering transitions.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Decide whether a request may pass.
    ///
    /// An open circuit whose recovery timeout has elapsed moves to half-open
    /// and admits this call as its first trial.
    pub fn is_allowed(&self) -> bool {
        let now = self.clock.now();
        let mut core = self.lock();

        match core.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = core.last_failure.map_or(true, |last| {
                    now.saturating_duration_since(last) >= core.config.recovery_timeout
                });
                if recovered {
                    debug!("circuit half-open");
                    core.state = CircuitState::HalfOpen;
                    core.half_open_calls = 1;
                    core.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if core.half_open_calls < core.config.half_open_max_calls {
                    core.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request.
    ///
    /// While closed this forgives one failure; while half-open it counts
    /// toward closing the circuit.
    pub fn record_success(&self) {
        let mut core = self.lock();

        match core.state {
            CircuitState::Closed => {
                core.consecutive_failures = core.consecutive_failures.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                core.half_open_successes += 1;
                if core.half_open_successes >= core.config.half_open_max_calls {
                    debug!("circuit closed");
                    core.close();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed request.
    ///
    /// Returns `true` if this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let now = self.clock.now();
        let mut core = self.lock();
        core.consecutive_failures = core.consecutive_failures.saturating_add(1);

        match core.state {
            CircuitState::Closed => {
                core.last_failure = Some(now);
                if core.consecutive_failures >= core.config.failure_threshold {
                    core.open(now);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                core.open(now);
                true
            }
            // The recovery window is measured from the opening failure.
            CircuitState::Open => false,
        }
    }

    /// Force the circuit open, restarting the recovery timeout.
    ///
    /// Returns `true` if the circuit was not already open.
    pub fn trip(&self) -> bool {
        let now = self.clock.now();
        let mut core = self.lock();
        let was_open = core.state == CircuitState::Open;
        core.open(now);
        !was_open
    }

    /// Time until an open circuit admits a trial call. Zero unless open.
    pub fn retry_after(&self) -> Duration {
        let now = self.clock.now();
        self.lock().retry_after(now)
    }

    /// Get the number of consecutive failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Get the active configuration.
    pub fn config(&self) -> CircuitBreakerConfig {
        self.lock().config
    }

    /// Apply a new configuration, keeping the current state.
    pub fn reconfigure(&self, config: CircuitBreakerConfig) {
        self.lock().config = config;
    }

    /// Snapshot the breaker.
    pub fn stats(&self) -> BreakerStats {
        let now = self.clock.now();
        let core = self.lock();
        BreakerStats {
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            half_open_calls: core.half_open_calls,
            half_open_successes: core.half_open_successes,
            retry_after: core.retry_after(now),
        }
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        let mut core = self.lock();
        core.close();
        core.last_failure = None;
    }
}

/// Shareable circuit breaker reference.
pub type SharedCircuitBreaker = Arc<CircuitBreaker>;
