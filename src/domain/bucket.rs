//! Token bucket accounting.
//!
//! A bucket holds up to `capacity` tokens and refills lazily: nothing happens
//! between calls, and every `consume` first credits the whole refill intervals
//! that elapsed since the last credit. An optional burst allowance lets a key
//! overspend briefly; that headroom recovers only as a fraction of regular
//! refills.

use std::time::{Duration, Instant};

/// Default fraction of refilled tokens that also pays back used burst headroom.
pub const DEFAULT_BURST_RECOVERY_RATIO: f64 = 0.1;

// Absorbs float drift from fractional refill rates and recovery ratios.
const EPSILON: f64 = 1e-9;

/// Static policy for one token bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucketConfig {
    /// Maximum number of regular tokens
    pub capacity: u32,
    /// Tokens credited per elapsed refill interval
    pub refill_rate: f64,
    /// Length of one refill interval
    pub refill_interval: Duration,
    /// Tokens available on creation (defaults to `capacity`)
    pub initial_tokens: Option<u32>,
    /// Extra tokens that may be spent beyond the regular budget
    pub burst_allowance: u32,
    /// Fraction of each refill that also reduces used burst headroom
    pub burst_recovery_ratio: f64,
}

impl TokenBucketConfig {
    /// Create a config with no burst allowance.
    pub fn new(capacity: u32, refill_rate: f64, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_rate,
            refill_interval,
            initial_tokens: None,
            burst_allowance: 0,
            burst_recovery_ratio: DEFAULT_BURST_RECOVERY_RATIO,
        }
    }

    /// Create a config that refills `refill_rate` tokens every second.
    pub fn per_second(capacity: u32, refill_rate: f64) -> Self {
        Self::new(capacity, refill_rate, Duration::from_secs(1))
    }

    /// Start the bucket with `tokens` instead of a full bucket.
    pub fn with_initial_tokens(mut self, tokens: u32) -> Self {
        self.initial_tokens = Some(tokens);
        self
    }

    /// Allow up to `burst` tokens beyond the regular capacity.
    pub fn with_burst_allowance(mut self, burst: u32) -> Self {
        self.burst_allowance = burst;
        self
    }

    /// Override how fast burst headroom recovers relative to refills.
    pub fn with_burst_recovery_ratio(mut self, ratio: f64) -> Self {
        self.burst_recovery_ratio = ratio;
        self
    }

    /// Check the config invariants.
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.capacity == 0 {
            return Err("bucket capacity must be greater than 0");
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err("bucket refill rate must be a positive number");
        }
        if self.refill_interval.is_zero() {
            return Err("bucket refill interval must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.burst_recovery_ratio) {
            return Err("burst recovery ratio must be between 0 and 1");
        }
        Ok(())
    }

    /// Suggested wait before retrying after a rejection.
    ///
    /// This is the time it takes the refill rate to produce one token,
    /// rounded up to whole milliseconds. For a one second interval that is
    /// `ceil(1000 / refill_rate)` ms.
    pub fn retry_after(&self) -> Duration {
        let interval_ms = self.refill_interval.as_secs_f64() * 1000.0;
        let ms = (interval_ms / self.refill_rate).ceil();
        if ms.is_finite() && ms > 0.0 {
            Duration::from_millis(ms as u64)
        } else {
            self.refill_interval
        }
    }

    fn starting_tokens(&self) -> f64 {
        f64::from(self.initial_tokens.unwrap_or(self.capacity).min(self.capacity))
    }
}

/// Mutable accounting for one bucket key.
///
/// All mutation takes `&mut self`; callers provide mutual exclusion (the
/// registry runs every access under the storage entry lock).
///
/// # Example
/// ```
/// use resource_throttle::{TokenBucket, TokenBucketConfig};
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let mut bucket = TokenBucket::new(TokenBucketConfig::per_second(2, 1.0), now);
///
/// assert!(bucket.consume(1, now));
/// assert!(bucket.consume(1, now));
/// assert!(!bucket.consume(1, now));
///
/// // One interval later a single token is back
/// assert!(bucket.consume(1, now + Duration::from_secs(1)));
/// ```
#[derive(Debug, Clone)]
pub struct TokenBucket {
    config: TokenBucketConfig,
    tokens: f64,
    last_refill: Instant,
    total_requests: u64,
    rejected_requests: u64,
    burst_tokens_used: f64,
}

impl TokenBucket {
    /// Create a bucket whose refill clock starts at `now`.
    pub fn new(config: TokenBucketConfig, now: Instant) -> Self {
        let tokens = config.starting_tokens();
        Self {
            config,
            tokens,
            last_refill: now,
            total_requests: 0,
            rejected_requests: 0,
            burst_tokens_used: 0.0,
        }
    }

    /// Try to take `n` tokens at `now`.
    ///
    /// Regular tokens are spent first, then burst headroom. Returns `false`
    /// and leaves the balance untouched when the combined budget is short.
    pub fn consume(&mut self, n: u32, now: Instant) -> bool {
        self.refill(now);
        self.total_requests = self.total_requests.saturating_add(1);

        let wanted = f64::from(n);
        if self.available() + EPSILON < wanted {
            self.rejected_requests = self.rejected_requests.saturating_add(1);
            return false;
        }

        let from_tokens = self.tokens.min(wanted);
        self.tokens = (self.tokens - from_tokens).max(0.0);

        let from_burst = wanted - from_tokens;
        if from_burst > 0.0 {
            self.burst_tokens_used =
                (self.burst_tokens_used + from_burst).min(f64::from(self.config.burst_allowance));
        }
        true
    }

    /// Credit every whole refill interval elapsed since the last credit.
    ///
    /// `last_refill` advances by whole intervals only, so partial progress
    /// toward the next interval is kept. A `now` earlier than the last credit
    /// is treated as no elapsed time.
    pub fn refill(&mut self, now: Instant) {
        let interval = self.config.refill_interval.as_nanos();
        if interval == 0 {
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill).as_nanos();
        let intervals = elapsed / interval;
        if intervals == 0 {
            return;
        }

        let added = intervals as f64 * self.config.refill_rate;
        self.tokens = (self.tokens + added).min(f64::from(self.config.capacity));
        self.burst_tokens_used =
            (self.burst_tokens_used - added * self.config.burst_recovery_ratio).max(0.0);

        let advance = u64::try_from(interval.saturating_mul(intervals)).unwrap_or(u64::MAX);
        self.last_refill = self
            .last_refill
            .checked_add(Duration::from_nanos(advance))
            .unwrap_or(now);
    }

    /// Regular tokens plus unused burst headroom.
    pub fn available(&self) -> f64 {
        let headroom = (f64::from(self.config.burst_allowance) - self.burst_tokens_used).max(0.0);
        self.tokens + headroom
    }

    /// Current regular token balance.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Whole regular tokens left.
    pub fn tokens_remaining(&self) -> u32 {
        (self.tokens + EPSILON).floor() as u32
    }

    /// Burst tokens spent and not yet recovered.
    pub fn burst_tokens_used(&self) -> f64 {
        self.burst_tokens_used
    }

    /// Instant up to which refills have been credited.
    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// The policy this bucket runs under.
    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    /// Swap in a new policy, keeping accumulated accounting.
    ///
    /// Balances are clamped to the new capacity and burst allowance.
    pub fn reconfigure(&mut self, config: TokenBucketConfig) {
        self.tokens = self.tokens.min(f64::from(config.capacity));
        self.burst_tokens_used = self
            .burst_tokens_used
            .min(f64::from(config.burst_allowance));
        self.config = config;
    }

    /// Refill to the starting balance and clear all counters.
    pub fn reset(&mut self, now: Instant) {
        self.tokens = self.config.starting_tokens();
        self.last_refill = now;
        self.total_requests = 0;
        self.rejected_requests = 0;
        self.burst_tokens_used = 0.0;
    }

    /// Snapshot the bucket's accounting.
    pub fn stats(&self) -> BucketStats {
        BucketStats {
            tokens: self.tokens,
            capacity: self.config.capacity,
            total_requests: self.total_requests,
            rejected_requests: self.rejected_requests,
            burst_tokens_used: self.burst_tokens_used,
            burst_allowance: self.config.burst_allowance,
        }
    }
}

/// A point-in-time snapshot of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStats {
    /// Regular tokens available
    pub tokens: f64,
    /// Configured capacity
    pub capacity: u32,
    /// Requests seen by this bucket
    pub total_requests: u64,
    /// Requests this bucket rejected
    pub rejected_requests: u64,
    /// Burst headroom currently spent
    pub burst_tokens_used: f64,
    /// Configured burst allowance
    pub burst_allowance: u32,
}

impl BucketStats {
    /// Ratio of rejected to total requests (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been seen.
    pub fn rejection_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.rejected_requests as f64 / self.total_requests as f64
        }
    }
}
