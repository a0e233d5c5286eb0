use std::net::SocketAddr;

use url::Url;

use crate::config::models::{GatewayConfig, RateLimitConfig, StateBackend, UpstreamConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route '{prefix}' targets unknown upstream '{upstream}'")]
    UnknownUpstream { prefix: String, upstream: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator.
///
/// Runs once before serving begins so a misconfigured gateway fails fast at
/// startup instead of failing per-request. Collects every problem it can
/// find rather than stopping at the first.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.auth.jwt_secret.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "auth.jwt_secret".to_string(),
            });
        }

        if config.state.backend == StateBackend::Redis && config.state.url.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "state.url".to_string(),
            });
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        }

        for (prefix, upstream) in &config.routes {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: format!("routes.{prefix}"),
                    message: "Route prefixes must start with '/'".to_string(),
                });
            }
            if !config.upstreams.contains_key(upstream) {
                errors.push(ValidationError::UnknownUpstream {
                    prefix: prefix.clone(),
                    upstream: upstream.clone(),
                });
            }
        }

        for (id, upstream) in &config.upstreams {
            if let Err(mut upstream_errors) = Self::validate_upstream(id, upstream) {
                errors.append(&mut upstream_errors);
            }
        }

        for (field, prefix) in config
            .protected_routes
            .iter()
            .map(|p| ("protected_routes", p))
            .chain(config.admin_routes.iter().map(|p| ("admin_routes", p)))
        {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!("Prefix '{prefix}' must start with '/'"),
                });
            }
        }

        let limits = &config.rate_limits;
        for (field, limit) in [
            ("rate_limits.default", &limits.default),
            ("rate_limits.health_services", &limits.health_services),
            ("rate_limits.analytics_stats", &limits.analytics_stats),
            ("rate_limits.analytics_logs", &limits.analytics_logs),
            ("rate_limits.rate_limit_info", &limits.rate_limit_info),
        ] {
            if let Err(e) = Self::validate_rate_limit(field, limit) {
                errors.push(e);
            }
        }

        if config.breaker.failure_threshold <= 0 {
            errors.push(ValidationError::InvalidField {
                field: "breaker.failure_threshold".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if config.breaker.open_window_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "breaker.open_window_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.health_check.enabled && config.health_check.interval_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "health_check.interval_secs".to_string(),
                message: "Must be greater than 0 when health checking is enabled".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:8000' or '0.0.0.0:8000')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate a single upstream descriptor.
    fn validate_upstream(
        id: &str,
        upstream: &UpstreamConfig,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        match Url::parse(&upstream.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::InvalidField {
                field: format!("upstreams.{id}.base_url"),
                message: format!("Unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidField {
                field: format!("upstreams.{id}.base_url"),
                message: format!("Not a valid URL: {e}"),
            }),
        }

        if upstream.base_url.ends_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("upstreams.{id}.base_url"),
                message: "Must not end with '/' (paths are appended verbatim)".to_string(),
            });
        }

        if upstream.timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: format!("upstreams.{id}.timeout_secs"),
                message: "Must be greater than 0".to_string(),
            });
        }

        if !upstream.health_path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("upstreams.{id}.health_path"),
                message: "Must start with '/'".to_string(),
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_rate_limit(field: &str, limit: &RateLimitConfig) -> ValidationResult<()> {
        if limit.requests == 0 {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "requests must be greater than 0".to_string(),
            });
        }
        if let Err(e) = humantime::parse_duration(&limit.period) {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid period '{}': {e}", limit.period),
            });
        }
        Ok(())
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .map(|e| format!("  • {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
