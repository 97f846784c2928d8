//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain types and owns all shared state:
//! - Rule engine (priority-ordered matching, atomic rule swaps)
//! - Circuit breakers (one per rule)
//! - Bucket and breaker registries (lazy creation, idle eviction)
//! - Rate limiter facade (one decision per request)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod circuit_breaker;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod rules;

#[cfg(feature = "async")]
pub mod sweeper;
