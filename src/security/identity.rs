//! Client identity middleware.
//!
//! Token verification happens in front of the gateway. When auth is
//! enabled, the authenticator's identity header is lifted into a
//! [`ClientIdentity`] request extension for the rate limiter to key on.
//!
//! The header is trusted as-is. The authenticator in front must strip or
//! overwrite any client-supplied copy; otherwise a client picks a fresh
//! rate limit bucket per value it sends. Leave auth disabled when the
//! gateway is reachable without that authenticator.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware::Next,
    response::Response,
};

use crate::config::AuthConfig;

/// State required for identity extraction.
#[derive(Clone, Debug)]
pub struct IdentityState {
    pub enabled: bool,
    pub header: HeaderName,
}

impl IdentityState {
    pub fn from_config(config: &AuthConfig) -> Self {
        // Validation rejects bad header names when auth is enabled.
        let header = HeaderName::from_bytes(config.identity_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-authenticated-user"));
        Self {
            enabled: config.enabled,
            header,
        }
    }
}

/// Identity attached to authenticated requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lift the identity header into [`ClientIdentity`] when auth is enabled.
///
/// Values are taken verbatim (trimmed); see the module docs for the trust
/// requirement on the upstream authenticator.
pub async fn identity_middleware(
    State(state): State<IdentityState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(req).await;
    }

    let identity = req
        .headers()
        .get(&state.header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| ClientIdentity(v.to_string()));

    if let Some(identity) = identity {
        req.extensions_mut().insert(identity);
    }
    next.run(req).await
}
