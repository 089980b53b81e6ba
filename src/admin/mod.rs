//! Admin API for inspecting the live policies.
//!
//! Served on its own listener, disabled by default, bearer-key protected.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::AdminConfig;
use crate::policies::Policies;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub policies: Arc<Policies>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

impl AdminState {
    pub fn new(policies: Arc<Policies>, config: &AdminConfig) -> Self {
        Self {
            policies,
            api_key: Arc::from(config.api_key.as_str()),
            started_at: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/limiter", get(get_limiter))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/evict", post(post_evict))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::GatewayConfig;
    use crate::resilience::Outcome;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn router() -> (Arc<Policies>, Router) {
        let policies = Arc::new(Policies::from_config(
            &GatewayConfig::default(),
            Arc::new(ManualClock::new()),
        ));
        let config = AdminConfig {
            enabled: true,
            api_key: "s3cret".into(),
            ..AdminConfig::default()
        };
        let router = setup_admin_router(AdminState::new(policies.clone(), &config));
        (policies, router)
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(router: Router, req: Request<Body>) -> serde_json::Value {
        let response = router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let (_, router) = router();
        let response = router
            .clone()
            .oneshot(request("GET", "/admin/status", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(request("GET", "/admin/status", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status_counts_tracked_keys() {
        let (policies, router) = router();
        policies.rate_limiter.consume("client-a", 1);
        policies.breakers.check_admission("GET:/x");

        let body = json(router, request("GET", "/admin/status", Some("s3cret"))).await;
        assert_eq!(body["status"], "operational");
        assert_eq!(body["tracked_clients"], 1);
        assert_eq!(body["tracked_routes"], 1);
        assert_eq!(body["open_circuits"], 0);
    }

    #[tokio::test]
    async fn test_breakers_lists_states() {
        let (policies, router) = router();
        for _ in 0..5 {
            policies.breakers.check_admission("GET:/x");
            policies.breakers.record_outcome("GET:/x", Outcome::ServerError);
        }

        let body = json(router, request("GET", "/admin/breakers", Some("s3cret"))).await;
        assert_eq!(body["open_timeout_secs"], 60);
        assert_eq!(body["breakers"][0]["route"], "GET:/x");
        assert_eq!(body["breakers"][0]["state"], "OPEN");
    }

    #[tokio::test]
    async fn test_limiter_settings() {
        let (_, router) = router();
        let body = json(router, request("GET", "/admin/limiter", Some("s3cret"))).await;
        assert_eq!(body["requests_per_window"], 60);
        assert_eq!(body["window_secs"], 60);
        assert_eq!(body["enabled"], true);
    }

    #[tokio::test]
    async fn test_evict_reports_counts() {
        let (_, router) = router();
        let body = json(router, request("POST", "/admin/evict", Some("s3cret"))).await;
        assert_eq!(body["rate_limit"], 0);
        assert_eq!(body["circuit_breaker"], 0);
    }
}
