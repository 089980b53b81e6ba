//! Network layer subsystem.
//!
//! Plain TCP listeners are bound by the caller and handed to
//! [`GatewayServer::run`](crate::http::GatewayServer::run); TLS listeners
//! are served through `axum-server` with the configuration loaded here.

pub mod tls;
