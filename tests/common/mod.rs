//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode, Uri},
    response::Response,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use secure_gateway::config::GatewayConfig;
use secure_gateway::lifecycle::Shutdown;
use secure_gateway::{GatewayServer, Policies};

/// Start a mock upstream application on an ephemeral port.
///
/// - `/x` and `/fail` answer 500
/// - `/slow` answers after five seconds
/// - `/echo` reports the path and `X-Forwarded-For` it received
/// - everything else answers 200 "ok"
pub async fn start_mock_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/x", any(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route(
            "/fail",
            any(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream failure") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .route("/echo", get(echo))
        .fallback(|| async { "ok" });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn echo(headers: HeaderMap, uri: Uri) -> Json<Value> {
    Json(json!({
        "path": uri.path(),
        "forwarded_for": headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok()),
    }))
}

/// Defaults pointed at `upstream`, with the metrics exporter off.
pub fn gateway_config(upstream: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.upstream.url = Some(format!("http://{upstream}"));
    config.observability.metrics_enabled = false;
    config
}

/// A request as if it arrived from `peer`.
pub fn request_from(method: &str, path: &str, peer: [u8; 4]) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
    req
}

pub fn request(method: &str, path: &str) -> Request<Body> {
    request_from(method, path, [127, 0, 0, 1])
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// A gateway serving on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub policies: Arc<Policies>,
    pub config_updates: mpsc::UnboundedSender<GatewayConfig>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let server = GatewayServer::new(config).unwrap();
    let policies = server.policies();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, updates) = mpsc::unbounded_channel();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, updates, signal).await;
    });

    TestGateway {
        addr,
        policies,
        config_updates,
        shutdown,
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
