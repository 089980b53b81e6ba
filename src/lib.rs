//! Secure API gateway library.
//!
//! A request pipeline that admits, throttles and protects calls to an
//! upstream application with a per-client token bucket rate limiter and a
//! per-route circuit breaker.

pub mod admin;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod policies;
pub mod registry;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use error::{GatewayError, HandlerFailure};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use policies::Policies;
