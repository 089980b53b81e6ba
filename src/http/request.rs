//! Request inspection helpers.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Resolve the client address, honoring forwarding headers only when
//!   the gateway sits behind a trusted proxy

use axum::{
    extract::ConnectInfo,
    http::{HeaderName, HeaderValue, Request},
};
use std::net::{IpAddr, SocketAddr};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Request ID generator producing UUID v4 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID assigned to `req`, if any.
pub fn request_id<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
}

/// Resolve the client address for `req`.
///
/// With `trust_proxy`, the left-most `X-Forwarded-For` entry (or
/// `X-Real-IP`) wins over the socket peer.
pub fn remote_ip<B>(req: &Request<B>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        let forwarded: Option<IpAddr> = req
            .headers()
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok());
        let real = || -> Option<IpAddr> {
            req.headers()
                .get(&X_REAL_IP)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        };
        if let Some(ip) = forwarded.or_else(real) {
            return Some(ip);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
