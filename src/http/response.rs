//! Response metadata written by the pipeline.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::resilience::CircuitState;
use crate::security::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_CIRCUIT_BREAKER_STATE: HeaderName =
    HeaderName::from_static("x-circuit-breaker-state");
pub const X_PROCESS_TIME: HeaderName = HeaderName::from_static("x-process-time");

/// Write limit, remaining and reset (Unix seconds) for `decision`.
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(now + decision.window.as_secs()),
    );
}

pub fn insert_circuit_state(headers: &mut HeaderMap, state: CircuitState) {
    headers.insert(
        X_CIRCUIT_BREAKER_STATE,
        HeaderValue::from_static(state.as_str()),
    );
}
