//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, layer order, listeners)
//!     → request.rs (request ID, client address)
//!     → middleware/ (access log, rate limiter, circuit breaker)
//!     → built-in routes or upstream.rs (forward to the application)
//!     → response.rs (policy headers)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
