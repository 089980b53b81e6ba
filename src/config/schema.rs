//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::registry::EvictionPolicy;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Backend that receives every non-builtin request.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-client token bucket settings.
    pub rate_limit: RateLimitConfig,

    /// Per-route circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Paths that bypass both protective policies (exact match).
    pub exempt_paths: Vec<String>,

    /// Authenticated identity propagation.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Security hardening settings.
    pub security: SecurityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            upstream: UpstreamConfig::default(),
            timeouts: TimeoutConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            exempt_paths: default_exempt_paths(),
            auth: AuthConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Health and documentation endpoints never throttled or tripped.
pub fn default_exempt_paths() -> Vec<String> {
    ["/health", "/", "/api/docs", "/api/redoc", "/api/openapi.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL requests are forwarded to (e.g., "http://127.0.0.1:3000").
    /// Without one, non-builtin routes answer 404.
    pub url: Option<String>,

    /// Deadline for a single upstream call in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timeout configuration for the whole request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time for request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Bucket capacity, refilled evenly over one window.
    pub requests_per_window: u32,

    /// Window length in seconds.
    pub window_seconds: u64,

    /// Bucket registry ceiling.
    pub max_entries: usize,

    /// Idle seconds before a bucket is evicted.
    pub ttl_seconds: u64,

    /// Minimum seconds between two eviction scans.
    pub eviction_interval_secs: u64,

    /// Trust X-Forwarded-For / X-Real-IP for the client address.
    ///
    /// Only enable behind a proxy that overwrites these headers; otherwise
    /// clients can pick their own bucket.
    pub trust_proxy: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 60,
            window_seconds: 60,
            max_entries: 10_000,
            ttl_seconds: 600,
            eviction_interval_secs: 60,
            trust_proxy: false,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn eviction(&self) -> EvictionPolicy {
        EvictionPolicy {
            max_entries: self.max_entries,
            ttl: Duration::from_secs(self.ttl_seconds),
            min_interval: Duration::from_secs(self.eviction_interval_secs),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breaking.
    pub enabled: bool,

    /// Consecutive failures that open a breaker.
    pub failure_threshold: u32,

    /// Seconds an open breaker rejects before allowing a trial.
    pub open_timeout_secs: u64,

    /// Breaker registry ceiling.
    pub max_entries: usize,

    /// Idle seconds before a breaker is evicted.
    pub ttl_seconds: u64,

    /// Minimum seconds between two eviction scans.
    pub eviction_interval_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            open_timeout_secs: 60,
            max_entries: 5_000,
            ttl_seconds: 1_800,
            eviction_interval_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn eviction(&self) -> EvictionPolicy {
        EvictionPolicy {
            max_entries: self.max_entries,
            ttl: Duration::from_secs(self.ttl_seconds),
            min_interval: Duration::from_secs(self.eviction_interval_secs),
        }
    }
}

/// Identity propagation from an upstream authenticator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Read the client identity from `identity_header`.
    ///
    /// Only enable behind an authenticator that strips or overwrites the
    /// header on every request; the value picks the client's rate limit
    /// bucket.
    pub enabled: bool,

    /// Header carrying the already-verified user id.
    pub identity_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            identity_header: "x-authenticated-user".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Placeholder admin key; validation refuses it when admin is enabled.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Add protective response headers.
    pub enable_headers: bool,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
