//! Request pipeline middleware.
//!
//! # Layer Order (outermost first)
//! ```text
//! security headers
//!     → request id (X-Request-ID)
//!     → identity
//!     → trace span + access_log.rs (X-Process-Time)
//!     → request timeout
//!     → rate_limit.rs
//!     → circuit_breaker.rs
//!     → panic catcher
//!     → body size limit
//!     → router
//! ```
//!
//! The breaker is the last gate before the handler, so a client that is
//! merely rate limited never counts against a route's health.

pub mod access_log;
pub mod circuit_breaker;
pub mod rate_limit;

pub use access_log::access_log_middleware;
pub use circuit_breaker::CircuitBreakerLayer;
pub use rate_limit::RateLimitLayer;
