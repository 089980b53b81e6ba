//! Tower layer applying the per-client rate limiter.

use axum::{
    http::Request,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::error::GatewayError;
use crate::http::request::{remote_ip, request_id};
use crate::http::response::insert_rate_limit_headers;
use crate::security::{client_key, ClientIdentity, RateLimiter, SharedExemptPaths};

/// Layer that spends one token per non-exempt request.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    exempt: SharedExemptPaths,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>, exempt: SharedExemptPaths) -> Self {
        Self { limiter, exempt }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            exempt: self.exempt.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    exempt: SharedExemptPaths,
}

impl<S, B> Service<Request<B>> for RateLimitService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Take the service that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !self.limiter.is_enabled() || self.exempt.load().contains(req.uri().path()) {
            return Box::pin(async move { Ok(inner.call(req).await?.into_response()) });
        }

        let identity = req.extensions().get::<ClientIdentity>().map(ClientIdentity::as_str);
        let key = client_key(identity, remote_ip(&req, self.limiter.trusts_proxy()));
        let decision = self.limiter.consume(&key, 1);

        if !decision.admitted {
            tracing::warn!(
                request_id = request_id(&req).unwrap_or("-"),
                client = %key,
                path = %req.uri().path(),
                limit = decision.limit,
                "Rate limit exceeded"
            );
            let mut response = GatewayError::RateLimitExceeded {
                limit: decision.limit,
                retry_after: decision.retry_after,
            }
            .into_response();
            insert_rate_limit_headers(response.headers_mut(), &decision);
            return Box::pin(async move { Ok(response) });
        }

        Box::pin(async move {
            let mut response = inner.call(req).await?.into_response();
            insert_rate_limit_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}
