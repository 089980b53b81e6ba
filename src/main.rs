//! Secure API Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ security headers ─▶ request id ─▶ identity ─▶ access log
//!                                                                      │
//!                                                                      ▼
//!                      circuit breaker ◀─ rate limiter ◀──────── request timeout
//!                            │
//!                            ▼
//!                     panic catcher ─▶ body limit ─▶ router ─▶ upstream
//!
//!     Cross-cutting: config (file + GATEWAY_* env, hot reload),
//!     observability (tracing, Prometheus), admin API, lifecycle
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use secure_gateway::admin::{setup_admin_router, AdminState};
use secure_gateway::config::{load_startup_config, watcher::ConfigWatcher};
use secure_gateway::lifecycle::{shutdown_signal, Shutdown};
use secure_gateway::observability::{logging, metrics};
use secure_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "secure-gateway")]
#[command(about = "API gateway with per-client rate limiting and per-route circuit breaking")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_startup_config(args.config.as_deref())?;

    if args.check {
        println!("Configuration OK");
        return Ok(());
    }

    logging::init_tracing(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "secure-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = config.upstream.url.as_deref().unwrap_or("-"),
        requests_per_window = config.rate_limit.requests_per_window,
        failure_threshold = config.circuit_breaker.failure_threshold,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics exporter");
        }
    }

    // Hot reload: the watcher must stay alive for the life of the process.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config.clone())?;

    if config.admin.enabled {
        let admin = setup_admin_router(AdminState::new(server.policies(), &config.admin));
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let signal = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, admin)
                .with_graceful_shutdown(signal.wait())
                .await
            {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let signal = shutdown.subscribe();
    let mut server_task = if config.listener.tls.is_some() {
        tokio::spawn(server.run_tls(config_updates, signal))
    } else {
        let listener = TcpListener::bind(&config.listener.bind_address).await?;
        tokio::spawn(server.run(listener, config_updates, signal))
    };

    tokio::select! {
        result = &mut server_task => result??,
        _ = shutdown_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
