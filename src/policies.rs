//! The protective policies shared by the pipeline and the admin API.

use std::sync::Arc;

use crate::clock::SharedClock;
use crate::config::GatewayConfig;
use crate::resilience::CircuitBreakers;
use crate::security::{ExemptPaths, RateLimiter, SharedExemptPaths};

/// Process-wide policy state, created once at startup.
pub struct Policies {
    pub rate_limiter: Arc<RateLimiter>,
    pub breakers: Arc<CircuitBreakers>,
    pub exempt: SharedExemptPaths,
}

impl Policies {
    pub fn from_config(config: &GatewayConfig, clock: SharedClock) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit, clock.clone())),
            breakers: Arc::new(CircuitBreakers::new(&config.circuit_breaker, clock)),
            exempt: ExemptPaths::new(config.exempt_paths.iter().cloned()).shared(),
        }
    }

    /// Apply a reloaded configuration. Tracked clients and routes are kept.
    pub fn apply(&self, config: &GatewayConfig) {
        self.rate_limiter.reconfigure(&config.rate_limit);
        self.breakers.reconfigure(&config.circuit_breaker);

        let exempt = ExemptPaths::new(config.exempt_paths.iter().cloned());
        if **self.exempt.load() != exempt {
            tracing::info!(count = exempt.len(), "Exempt paths updated");
            self.exempt.store(Arc::new(exempt));
        }
    }
}
