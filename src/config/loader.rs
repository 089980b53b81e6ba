//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "GATEWAY_";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    Env { key: String, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load the startup configuration: file (or defaults), then `GATEWAY_*`
/// environment overrides, then validation.
pub fn load_startup_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply overrides read through `lookup`, which receives full variable names
/// (e.g. `GATEWAY_REQUESTS_PER_WINDOW`).
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        let key = format!("{ENV_PREFIX}{name}");
        lookup(&key).map(|value| (key, value))
    };

    if let Some((_, value)) = get("BIND_ADDRESS") {
        config.listener.bind_address = value;
    }
    if let Some((_, value)) = get("UPSTREAM_URL") {
        config.upstream.url = Some(value).filter(|v| !v.is_empty());
    }
    if let Some(kv) = get("REQUESTS_PER_WINDOW") {
        config.rate_limit.requests_per_window = parse(kv)?;
    }
    if let Some(kv) = get("WINDOW_SECONDS") {
        config.rate_limit.window_seconds = parse(kv)?;
    }
    if let Some(kv) = get("RATE_LIMIT_MAX_ENTRIES") {
        config.rate_limit.max_entries = parse(kv)?;
    }
    if let Some(kv) = get("RATE_LIMIT_TTL_SECONDS") {
        config.rate_limit.ttl_seconds = parse(kv)?;
    }
    if let Some(kv) = get("TRUST_PROXY") {
        config.rate_limit.trust_proxy = parse(kv)?;
    }
    if let Some(kv) = get("FAILURE_THRESHOLD") {
        config.circuit_breaker.failure_threshold = parse(kv)?;
    }
    if let Some(kv) = get("OPEN_TIMEOUT_SECS") {
        config.circuit_breaker.open_timeout_secs = parse(kv)?;
    }
    if let Some(kv) = get("BREAKER_MAX_ENTRIES") {
        config.circuit_breaker.max_entries = parse(kv)?;
    }
    if let Some(kv) = get("BREAKER_TTL_SECONDS") {
        config.circuit_breaker.ttl_seconds = parse(kv)?;
    }
    if let Some((_, value)) = get("EXEMPT_PATHS") {
        config.exempt_paths = value
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some((_, value)) = get("LOG_LEVEL") {
        config.observability.log_level = value;
    }
    if let Some((_, value)) = get("LOG_FORMAT") {
        config.observability.log_format = value;
    }
    if let Some((_, value)) = get("ADMIN_API_KEY") {
        config.admin.api_key = value;
    }

    Ok(())
}

fn parse<T: std::str::FromStr>((key, value): (String, String)) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { key, value })
}
