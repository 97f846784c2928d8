//! Mock implementations for testing.
//!
//! Test doubles for the clock and event sink ports, so time-dependent and
//! notification behavior can be asserted deterministically.

pub mod clock;
pub mod sink;

pub use clock::MockClock;
pub use sink::RecordingSink;
