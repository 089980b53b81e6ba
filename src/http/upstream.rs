//! Forwarding to the upstream application.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the configured base URL
//! - Strip hop-by-hop headers and append `X-Forwarded-For`
//! - Enforce the upstream deadline
//!
//! # Design Decisions
//! - Connection errors become 502, deadlines 504; both are handler failures
//! - Response bodies are streamed back without buffering

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        header,
        uri::{InvalidUri, PathAndQuery},
        HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::error::{ErrorBody, HandlerFailure};
use crate::http::server::AppState;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
];
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Client for the upstream application.
#[derive(Clone, Debug)]
pub struct Upstream {
    base: Uri,
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl Upstream {
    /// Build a client for the configured URL, if there is one.
    pub fn from_config(config: &UpstreamConfig) -> Result<Option<Self>, InvalidUri> {
        let Some(url) = &config.url else {
            return Ok(None);
        };

        Ok(Some(Self {
            base: url.parse()?,
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            timeout: config.timeout(),
        }))
    }

    pub fn base(&self) -> &Uri {
        &self.base
    }

    /// Join the base URL with the path and query of `original`.
    pub fn target_uri(&self, original: &Uri) -> Result<Uri, axum::http::Error> {
        let prefix = self.base.path().trim_end_matches('/');
        let suffix = original
            .path_and_query()
            .map_or("/", PathAndQuery::as_str);
        let path_and_query = format!("{prefix}{suffix}");

        let mut builder = Uri::builder().path_and_query(path_and_query);
        if let Some(scheme) = self.base.scheme() {
            builder = builder.scheme(scheme.clone());
        }
        if let Some(authority) = self.base.authority() {
            builder = builder.authority(authority.clone());
        }
        builder.build()
    }

    /// Send `req` upstream and return its response.
    pub async fn forward(&self, req: Request<Body>) -> Result<Response, HandlerFailure> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let (mut parts, body) = req.into_parts();

        parts.uri = self.target_uri(&parts.uri)?;
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove(header::HOST);
        if let Some(ip) = peer {
            append_forwarded_for(&mut parts.headers, &ip.to_string());
        }

        let outbound = Request::from_parts(parts, body);
        match tokio::time::timeout(self.timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => {
                let mut response = response.map(Body::new);
                strip_hop_by_hop(response.headers_mut());
                Ok(response)
            }
            Ok(Err(err)) => Err(HandlerFailure::Upstream(err)),
            Err(_) => Err(HandlerFailure::Timeout(self.timeout)),
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {ip}"),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Fallback handler: forwards everything the built-in routes don't serve.
pub async fn forward_handler(State(state): State<AppState>, req: Request<Body>) -> Response {
    let Some(upstream) = &state.upstream else {
        let body = ErrorBody {
            error: "Not Found",
            message: format!("No route for {}", req.uri().path()),
            retry_after: None,
        };
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    };

    match upstream.forward(req).await {
        Ok(response) => response,
        Err(failure) => failure.into_response(),
    }
}
