//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → identity.rs (lift authenticated identity into the request)
//!     → exempt.rs (health/docs paths skip the policies)
//!     → rate_limit.rs (per-client token bucket)
//!     → Pass to circuit breaker
//!
//! Outgoing response:
//!     → headers.rs (protective response headers)
//! ```
//!
//! # Design Decisions
//! - Anonymous clients are keyed by a hash of their address, never the raw IP
//! - Authenticated and anonymous clients never share a bucket
//! - Forwarded-for headers are only trusted when configured

pub mod exempt;
pub mod headers;
pub mod identity;
pub mod rate_limit;

pub use exempt::{ExemptPaths, SharedExemptPaths};
pub use identity::ClientIdentity;
pub use rate_limit::{client_key, RateLimitDecision, RateLimiter, TokenBucket};
