//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request admitted by the rate limiter:
//!     → circuit_breaker.rs (admission check for METHOD:path)
//!     → handler runs
//!     → circuit_breaker.rs (record success / server error / exception)
//! ```
//!
//! # Design Decisions
//! - One breaker per literal route string, created on first use
//! - Breakers age out of the registry when a route goes quiet
//! - Recording never changes the response the caller receives

pub mod circuit_breaker;

pub use circuit_breaker::{
    route_key, Admission, BreakerSnapshot, CircuitBreaker, CircuitBreakers, CircuitState, Outcome,
};
