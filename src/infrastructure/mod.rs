//! Infrastructure layer - adapters and wiring.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Storage implementations (sharded maps with optional LRU cap)
//! - Event sinks (tracing, no-op)
//! - Serializable configuration and the limiter builder

pub mod builder;
pub mod clock;
pub mod config;
pub mod eviction;
pub mod sink;
pub mod storage;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// resource-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
