//! Tower layer applying the per-route circuit breaker.
//!
//! Sits directly above the handler, so only requests it admitted can
//! affect a route's failure count.

use axum::{
    http::Request,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::error::{GatewayError, HandlerFailed};
use crate::http::response::insert_circuit_state;
use crate::resilience::{route_key, Admission, CircuitBreakers, Outcome};
use crate::security::SharedExemptPaths;

#[derive(Clone)]
pub struct CircuitBreakerLayer {
    breakers: Arc<CircuitBreakers>,
    exempt: SharedExemptPaths,
}

impl CircuitBreakerLayer {
    pub fn new(breakers: Arc<CircuitBreakers>, exempt: SharedExemptPaths) -> Self {
        Self { breakers, exempt }
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breakers: self.breakers.clone(),
            exempt: self.exempt.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breakers: Arc<CircuitBreakers>,
    exempt: SharedExemptPaths,
}

/// Classify a handler response for the breaker.
pub fn classify(response: &Response) -> Outcome {
    if response.extensions().get::<HandlerFailed>().is_some() {
        Outcome::Exception
    } else if response.status().is_server_error() {
        Outcome::ServerError
    } else {
        Outcome::Success
    }
}

impl<S, B> Service<Request<B>> for CircuitBreakerService<S>
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
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !self.breakers.is_enabled() || self.exempt.load().contains(req.uri().path()) {
            return Box::pin(async move { Ok(inner.call(req).await?.into_response()) });
        }

        let route = route_key(req.method(), req.uri().path());
        if let Admission::Rejected { retry_after } = self.breakers.check_admission(&route) {
            let response = GatewayError::CircuitOpen { route, retry_after }.into_response();
            return Box::pin(async move { Ok(response) });
        }

        let breakers = self.breakers.clone();
        // Nothing below the await runs if the caller drops the future, so a
        // cancelled request records no outcome.
        Box::pin(async move {
            match inner.call(req).await {
                Ok(response) => {
                    let mut response = response.into_response();
                    let state = breakers.record_outcome(&route, classify(&response));
                    insert_circuit_state(response.headers_mut(), state);
                    Ok(response)
                }
                Err(err) => {
                    breakers.record_outcome(&route, Outcome::Exception);
                    Err(err)
                }
            }
        })
    }
}
