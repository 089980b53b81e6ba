//! Access log middleware.
//!
//! Runs outside the protective layers so rejected requests are logged with
//! their real status and timing.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;

use crate::http::request::request_id;
use crate::http::response::X_PROCESS_TIME;
use crate::observability::metrics;
use crate::security::ClientIdentity;

pub async fn access_log_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = request_id(&req).unwrap_or("-").to_string();
    let client = req
        .extensions()
        .get::<ClientIdentity>()
        .map(|id| format!("user:{}", id.as_str()))
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    let mut response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        response.headers_mut().insert(X_PROCESS_TIME, value);
    }

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status,
        latency_ms = elapsed.as_millis() as u64,
        client = %client,
        "Request completed"
    );
    metrics::record_request(method.as_str(), status, start);

    response
}
