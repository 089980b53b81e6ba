//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and addresses. Every
//! problem is reported, not just the first.

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::{GatewayConfig, ADMIN_KEY_PLACEHOLDER};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be at least 1")]
    MustBePositive { field: &'static str },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("upstream.url is not an absolute http URL: {0}")]
    InvalidUpstream(String),

    #[error("exempt path must start with '/': {0}")]
    InvalidExemptPath(String),

    #[error("auth.identity_header is not a valid header name: {0}")]
    InvalidIdentityHeader(String),

    #[error("admin.api_key must be changed when the admin API is enabled")]
    PlaceholderAdminKey,

    #[error("observability.log_format must be \"pretty\" or \"json\", got {0}")]
    UnknownLogFormat(String),
}

/// Check `config`, returning every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let positive: [(&'static str, u64); 13] = [
        ("rate_limit.requests_per_window", config.rate_limit.requests_per_window.into()),
        ("rate_limit.window_seconds", config.rate_limit.window_seconds),
        ("rate_limit.max_entries", config.rate_limit.max_entries as u64),
        ("rate_limit.ttl_seconds", config.rate_limit.ttl_seconds),
        ("circuit_breaker.failure_threshold", config.circuit_breaker.failure_threshold.into()),
        ("circuit_breaker.open_timeout_secs", config.circuit_breaker.open_timeout_secs),
        ("circuit_breaker.max_entries", config.circuit_breaker.max_entries as u64),
        ("circuit_breaker.ttl_seconds", config.circuit_breaker.ttl_seconds),
        ("upstream.timeout_secs", config.upstream.timeout_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("security.max_body_size", config.security.max_body_size as u64),
        // Zero would scan on every request.
        ("rate_limit.eviction_interval_secs", config.rate_limit.eviction_interval_secs),
        (
            "circuit_breaker.eviction_interval_secs",
            config.circuit_breaker.eviction_interval_secs,
        ),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::MustBePositive { field });
        }
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key == ADMIN_KEY_PLACEHOLDER || config.admin.api_key.is_empty() {
            errors.push(ValidationError::PlaceholderAdminKey);
        }
    }

    if let Some(raw) = &config.upstream.url {
        let valid = Url::parse(raw)
            .map(|url| url.scheme() == "http" && url.host().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidUpstream(raw.clone()));
        }
    }

    for path in &config.exempt_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidExemptPath(path.clone()));
        }
    }

    if config.auth.enabled
        && axum::http::HeaderName::from_bytes(config.auth.identity_header.as_bytes()).is_err()
    {
        errors.push(ValidationError::InvalidIdentityHeader(
            config.auth.identity_header.clone(),
        ));
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::UnknownLogFormat(
            config.observability.log_format.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = GatewayConfig::default();
        config.rate_limit.requests_per_window = 0;
        config.circuit_breaker.failure_threshold = 0;
        config.listener.bind_address = "not-an-address".into();
        config.exempt_paths.push("health".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::MustBePositive {
            field: "rate_limit.requests_per_window"
        }));
        assert!(errors.contains(&ValidationError::MustBePositive {
            field: "circuit_breaker.failure_threshold"
        }));
        assert!(errors.contains(&ValidationError::InvalidExemptPath("health".into())));
    }

    #[test]
    fn test_upstream_must_be_absolute_http() {
        let mut config = GatewayConfig::default();
        config.upstream.url = Some("ftp://example.com".into());
        assert!(validate_config(&config).is_err());

        // The upstream client speaks plain HTTP only.
        config.upstream.url = Some("https://example.com".into());
        assert!(validate_config(&config).is_err());

        config.upstream.url = Some("/relative".into());
        assert!(validate_config(&config).is_err());

        config.upstream.url = Some("http://127.0.0.1:3000".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_admin_requires_real_key() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::PlaceholderAdminKey])
        );

        config.admin.api_key = "s3cret".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = GatewayConfig::default();
        config.observability.log_format = "xml".into();
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::UnknownLogFormat("xml".into())])
        );
    }
}
