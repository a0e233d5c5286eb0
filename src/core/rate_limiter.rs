//! Per-surface rate limiting built atop `governor`.
//!
//! Each inbound surface (the catch-all proxy handler plus the reserved
//! gateway endpoints) gets its own keyed limiter, keyed by client IP. The
//! quotas are static configuration; violation surfaces as a
//! `GatewayError::RateLimited` so the outermost handler renders it like any
//! other pipeline outcome.
use std::{net::IpAddr, num::NonZeroU32};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
};

use crate::{config::models::RateLimitConfig, core::error::GatewayError};

/// IP-keyed governor limiter instance.
pub type IpKeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// A quota-enforcing limiter for one gateway surface.
pub struct SurfaceLimiter {
    limiter: IpKeyedLimiter,
    /// Human-readable quota, e.g. `200/1m`, echoed by `/rate-limit/info`.
    description: String,
}

impl SurfaceLimiter {
    /// Build a limiter from its configured quota.
    pub fn new(config: &RateLimitConfig) -> Result<Self, String> {
        let period = humantime::parse_duration(&config.period)
            .map_err(|e| format!("invalid rate limit period '{}': {e}", config.period))?;

        let burst = NonZeroU32::new(config.requests as u32)
            .ok_or_else(|| "rate limit 'requests' must be greater than 0".to_string())?;

        let quota = Quota::with_period(period)
            .ok_or_else(|| format!("invalid rate limit period duration: {period:?}"))?
            .allow_burst(burst);

        Ok(Self {
            limiter: RateLimiter::keyed(quota),
            description: format!("{}/{}", config.requests, config.period),
        })
    }

    /// Enforce the quota for a client address.
    ///
    /// Requests with no resolvable client address are allowed: limiting is
    /// best-effort and must not reject local or test traffic that carries
    /// no peer address.
    pub fn check(&self, client_ip: Option<IpAddr>) -> Result<(), GatewayError> {
        match client_ip {
            Some(ip) => self
                .limiter
                .check_key(&ip)
                .map_err(|_| GatewayError::RateLimited),
            None => Ok(()),
        }
    }

    /// The configured quota in `requests/period` form.
    pub fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(requests: u64, period: &str) -> RateLimitConfig {
        RateLimitConfig {
            requests,
            period: period.to_string(),
        }
    }

    #[test]
    fn test_limiter_creation() {
        assert!(SurfaceLimiter::new(&config(10, "1m")).is_ok());
    }

    #[test]
    fn test_invalid_period_rejected() {
        assert!(SurfaceLimiter::new(&config(10, "eventually")).is_err());
    }

    #[test]
    fn test_zero_requests_rejected() {
        assert!(SurfaceLimiter::new(&config(0, "1m")).is_err());
    }

    #[test]
    fn test_quota_enforced_per_ip() {
        let limiter = SurfaceLimiter::new(&config(3, "1h")).unwrap();
        let alice: IpAddr = "10.0.0.1".parse().unwrap();
        let bob: IpAddr = "10.0.0.2".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.check(Some(alice)).is_ok());
        }
        assert!(matches!(
            limiter.check(Some(alice)),
            Err(GatewayError::RateLimited)
        ));

        // A different client still has a full quota.
        assert!(limiter.check(Some(bob)).is_ok());
    }

    #[test]
    fn test_missing_address_is_allowed() {
        let limiter = SurfaceLimiter::new(&config(1, "1h")).unwrap();
        for _ in 0..10 {
            assert!(limiter.check(None).is_ok());
        }
    }

    #[test]
    fn test_description_round_trips_config() {
        let limiter = SurfaceLimiter::new(&config(200, "1m")).unwrap();
        assert_eq!(limiter.description(), "200/1m");
    }
}
