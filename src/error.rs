//! Gateway error types and their HTTP mapping.
//!
//! # Design Decisions
//! - Rejections carry a machine-readable reason and a retry hint
//! - Handler failures keep their cause and are tagged with [`HandlerFailed`]
//!   so the circuit breaker counts them as exceptions, not plain 5xx

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

/// Response extension marking a response produced by a failed handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerFailed;

/// Errors surfaced to clients by the request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("rate limit of {limit} requests exceeded")]
    RateLimitExceeded { limit: u32, retry_after: Duration },

    #[error("circuit breaker for {route} is open")]
    CircuitOpen { route: String, retry_after: Duration },

    #[error(transparent)]
    Handler(#[from] HandlerFailure),
}

/// A failure inside the handler stage.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFailure {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error("could not build upstream request: {0}")]
    Request(#[from] axum::http::Error),
}

impl HandlerFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerFailure::Upstream(_) => StatusCode::BAD_GATEWAY,
            HandlerFailure::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            HandlerFailure::Panic(_) | HandlerFailure::Request(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON body shared by every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Handler(failure) => failure.status(),
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            GatewayError::RateLimitExceeded { limit, retry_after } => ErrorBody {
                error: "Rate limit exceeded",
                message: format!(
                    "Too many requests. Limit: {limit} requests per {} seconds",
                    retry_after.as_secs()
                ),
                retry_after: Some(retry_after.as_secs()),
            },
            GatewayError::CircuitOpen { retry_after, .. } => ErrorBody {
                error: "Service Unavailable",
                message: "Circuit breaker is OPEN. Service is temporarily unavailable."
                    .to_string(),
                retry_after: Some(retry_after.as_secs()),
            },
            GatewayError::Handler(HandlerFailure::Upstream(_)) => ErrorBody {
                error: "Bad Gateway",
                message: "Upstream request failed".to_string(),
                retry_after: None,
            },
            GatewayError::Handler(HandlerFailure::Timeout(_)) => ErrorBody {
                error: "Gateway Timeout",
                message: "Upstream did not respond in time".to_string(),
                retry_after: None,
            },
            GatewayError::Handler(_) => ErrorBody {
                error: "Internal Server Error",
                message: "An unexpected error occurred".to_string(),
                retry_after: None,
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        let retry_after = body.retry_after;

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if let GatewayError::Handler(failure) = &self {
            tracing::error!(error = %failure, "Handler failed");
            response.extensions_mut().insert(HandlerFailed);
        }
        response
    }
}

impl IntoResponse for HandlerFailure {
    fn into_response(self) -> Response {
        GatewayError::Handler(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limit_rejection_shape() {
        let response = GatewayError::RateLimitExceeded {
            limit: 2,
            retry_after: Duration::from_secs(60),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
        assert!(response.extensions().get::<HandlerFailed>().is_none());

        let body = body_json(response).await;
        assert_eq!(body["error"], "Rate limit exceeded");
        assert_eq!(body["retry_after"], 60);
    }

    #[tokio::test]
    async fn test_circuit_open_rejection_shape() {
        let response = GatewayError::CircuitOpen {
            route: "GET:/x".into(),
            retry_after: Duration::from_secs(30),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
        let body = body_json(response).await;
        assert_eq!(body["retry_after"], 30);
    }

    #[tokio::test]
    async fn test_handler_failures_are_tagged() {
        let response = HandlerFailure::Timeout(Duration::from_secs(5)).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(response.extensions().get::<HandlerFailed>().is_some());
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let body = body_json(response).await;
        assert!(body.get("retry_after").is_none());

        let response = HandlerFailure::Panic("boom".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<HandlerFailed>().is_some());
    }
}
