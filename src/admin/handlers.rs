use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::resilience::{BreakerSnapshot, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub tracked_clients: usize,
    pub tracked_routes: usize,
    pub open_circuits: usize,
}

#[derive(Serialize)]
pub struct LimiterStatus {
    pub enabled: bool,
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub trust_proxy: bool,
    pub tracked_clients: usize,
}

#[derive(Serialize)]
pub struct BreakerStatus {
    pub enabled: bool,
    pub open_timeout_secs: u64,
    pub breakers: Vec<BreakerSnapshot>,
}

#[derive(Serialize)]
pub struct EvictionReport {
    pub rate_limit: usize,
    pub circuit_breaker: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let breakers = &state.policies.breakers;
    let open_circuits = breakers
        .snapshot()
        .iter()
        .filter(|b| b.state != CircuitState::Closed)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        tracked_clients: state.policies.rate_limiter.tracked_clients(),
        tracked_routes: breakers.tracked_routes(),
        open_circuits,
    })
}

pub async fn get_limiter(State(state): State<AdminState>) -> Json<LimiterStatus> {
    let limiter = &state.policies.rate_limiter;
    Json(LimiterStatus {
        enabled: limiter.is_enabled(),
        requests_per_window: limiter.limit(),
        window_secs: limiter.window().as_secs(),
        trust_proxy: limiter.trusts_proxy(),
        tracked_clients: limiter.tracked_clients(),
    })
}

pub async fn get_breakers(State(state): State<AdminState>) -> Json<BreakerStatus> {
    let breakers = &state.policies.breakers;
    Json(BreakerStatus {
        enabled: breakers.is_enabled(),
        open_timeout_secs: breakers.open_timeout().as_secs(),
        breakers: breakers.snapshot(),
    })
}

/// Force an eviction pass on both registries.
pub async fn post_evict(State(state): State<AdminState>) -> Json<EvictionReport> {
    let report = EvictionReport {
        rate_limit: state.policies.rate_limiter.evict_stale(),
        circuit_breaker: state.policies.breakers.evict_stale(),
    };
    tracing::info!(
        rate_limit = report.rate_limit,
        circuit_breaker = report.circuit_breaker,
        "Forced eviction pass"
    );
    Json(report)
}
