//! Configuration data structures for Portico.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files
//! and are serde-friendly with defaults so minimal configs stay concise.
//! The whole tree is loaded once at startup, validated, and never mutated
//! afterwards: the route table, upstream set and access-control prefixes
//! are static for the life of the process.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::core::breaker::BreakerPolicy;

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub state: StateConfig,
    /// Known upstream services, keyed by service id.
    pub upstreams: HashMap<String, UpstreamConfig>,
    /// Path prefix → upstream id dispatch table.
    pub routes: HashMap<String, String>,
    /// Prefixes that require a verified bearer token.
    #[serde(default)]
    pub protected_routes: Vec<String>,
    /// Prefixes that additionally require the admin role.
    #[serde(default)]
    pub admin_routes: Vec<String>,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            auth: AuthConfig::default(),
            state: StateConfig::default(),
            upstreams: HashMap::new(),
            routes: HashMap::new(),
            protected_routes: Vec::new(),
            admin_routes: Vec::new(),
            breaker: BreakerConfig::default(),
            health_check: HealthCheckConfig::default(),
            rate_limits: RateLimitsConfig::default(),
        }
    }
}

/// Bearer-token verification settings.
///
/// The secret is deployment-supplied; the loader's environment overlay
/// (`PORTICO__AUTH__JWT_SECRET`) is the expected channel in production.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Which shared state backend holds breaker records and analytics.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    /// Networked store shared by all gateway instances.
    Redis,
    /// Process-local store; single-instance deployments and tests.
    Memory,
}

/// Shared state store settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StateConfig {
    pub backend: StateBackend,
    pub url: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Redis,
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_health_path() -> String {
    "/health".to_string()
}

/// One downstream service the gateway can forward to. Immutable after
/// startup.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Scheme + authority, no trailing slash, e.g. `http://localhost:8001`.
    pub base_url: String,
    /// Per-call deadline for forwarded requests.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Probe path for health checks.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Full URL of this upstream's health probe endpoint.
    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_path)
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: i64,
    pub open_window_secs: u64,
    pub record_ttl_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_window_secs: 60,
            record_ttl_secs: 300,
        }
    }
}

impl BreakerConfig {
    pub fn policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: self.failure_threshold,
            open_window: Duration::from_secs(self.open_window_secs),
            record_ttl: Duration::from_secs(self.record_ttl_secs),
        }
    }
}

/// Background health prober settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 2,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// A single quota: `requests` per `period` (humantime, e.g. "1m", "30s").
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests: u64,
    pub period: String,
}

impl RateLimitConfig {
    fn per_minute(requests: u64) -> Self {
        Self {
            requests,
            period: "1m".to_string(),
        }
    }
}

/// Quotas for each inbound surface.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// Catch-all proxy handler.
    pub default: RateLimitConfig,
    pub health_services: RateLimitConfig,
    pub analytics_stats: RateLimitConfig,
    pub analytics_logs: RateLimitConfig,
    pub rate_limit_info: RateLimitConfig,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            default: RateLimitConfig::per_minute(200),
            health_services: RateLimitConfig::per_minute(10),
            analytics_stats: RateLimitConfig::per_minute(20),
            analytics_logs: RateLimitConfig::per_minute(10),
            rate_limit_info: RateLimitConfig::per_minute(30),
        }
    }
}

/// Per-upstream health as observed by the background prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "unhealthy")]
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_health_url() {
        let upstream = UpstreamConfig {
            base_url: "http://localhost:8001".to_string(),
            timeout_secs: 30,
            health_path: "/health".to_string(),
        };
        assert_eq!(upstream.health_url(), "http://localhost:8001/health");
        assert_eq!(upstream.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_breaker_defaults_match_policy() {
        let policy = BreakerConfig::default().policy();
        assert_eq!(policy.failure_threshold, 5);
        assert_eq!(policy.open_window, Duration::from_secs(60));
        assert_eq!(policy.record_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_upstream_defaults_fill_in() {
        let upstream: UpstreamConfig =
            serde_json::from_str(r#"{"base_url": "http://localhost:9000"}"#).unwrap();
        assert_eq!(upstream.timeout_secs, 30);
        assert_eq!(upstream.health_path, "/health");
    }
}
