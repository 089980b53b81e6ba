//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the built-in routes and upstream fallback
//! - Wire up the pipeline layers in their fixed order
//! - Bind to a plain or TLS listener with graceful shutdown
//! - Apply hot-reloaded configuration to the live policies

use axum::{
    extract::State,
    http::uri::InvalidUri,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::clock::{SharedClock, SystemClock};
use crate::config::GatewayConfig;
use crate::error::HandlerFailure;
use crate::http::middleware::{access_log_middleware, CircuitBreakerLayer, RateLimitLayer};
use crate::http::request::MakeRequestUuid;
use crate::http::upstream::{forward_handler, Upstream};
use crate::lifecycle::ShutdownSignal;
use crate::net::tls::load_tls_config;
use crate::policies::Policies;
use crate::security::headers::apply_security_headers;
use crate::security::identity::{identity_middleware, IdentityState};

/// How long TLS connections get to drain after shutdown is triggered.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Option<Upstream>,
    pub started_at: Instant,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    policies: Arc<Policies>,
}

impl GatewayServer {
    /// Create a server with the given (validated) configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, InvalidUri> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a server whose policies read time from `clock`.
    pub fn with_clock(config: GatewayConfig, clock: SharedClock) -> Result<Self, InvalidUri> {
        let policies = Arc::new(Policies::from_config(&config, clock));
        let state = AppState {
            upstream: Upstream::from_config(&config.upstream)?,
            started_at: Instant::now(),
        };

        let router = Self::build_router(&config, &policies, state);
        Ok(Self {
            router,
            config,
            policies,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers are added innermost first; the last `layer` call runs first.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, policies: &Policies, state: AppState) -> Router {
        let router = Router::new()
            .route("/", get(banner))
            .route("/health", get(health))
            .fallback(forward_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(CircuitBreakerLayer::new(
                policies.breakers.clone(),
                policies.exempt.clone(),
            ))
            .layer(RateLimitLayer::new(
                policies.rate_limiter.clone(),
                policies.exempt.clone(),
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn(access_log_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn_with_state(
                IdentityState::from_config(&config.auth),
                identity_middleware,
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        if config.security.enable_headers {
            apply_security_headers(router)
        } else {
            router
        }
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn policies(&self) -> Arc<Policies> {
        self.policies.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: ShutdownSignal,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        spawn_reloader(self.policies.clone(), config_updates, shutdown.clone());

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS using the configured certificate.
    pub async fn run_tls(
        self,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: ShutdownSignal,
    ) -> Result<(), io::Error> {
        let Some(tls) = self.config.listener.tls.clone() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "listener.tls is not configured",
            ));
        };
        let addr: SocketAddr = self
            .config
            .listener
            .bind_address
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let rustls = load_tls_config(&tls).await?;

        tracing::info!(address = %addr, "HTTPS server starting");
        spawn_reloader(self.policies.clone(), config_updates, shutdown.clone());

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(
                self.router
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Apply configuration updates until the channel closes or shutdown fires.
fn spawn_reloader(
    policies: Arc<Policies>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    shutdown: ShutdownSignal,
) {
    tokio::spawn(async move {
        let stopped = shutdown.wait();
        tokio::pin!(stopped);
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => {
                        policies.apply(&config);
                        tracing::info!("Configuration reloaded");
                    }
                    None => break,
                },
                _ = &mut stopped => break,
            }
        }
    });
}

async fn banner() -> Json<serde_json::Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    HandlerFailure::Panic(detail).into_response()
}
