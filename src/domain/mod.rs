//! Domain layer - pure rate limiting logic with no external dependencies.
//!
//! This layer holds the vocabulary and the one stateful algorithm that needs no
//! coordination:
//! - Token bucket accounting with lazy refill and burst headroom
//! - Circuit breaker configuration and states
//! - Rules, scopes and escalation actions
//! - Request contexts and decision results
//!
//! Time is always passed in, so everything here is deterministic to test.

pub mod breaker;
pub mod bucket;
pub mod event;
pub mod request;
pub mod rule;
