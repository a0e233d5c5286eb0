//! Per-upstream health state.
//!
//! The upstream set is fixed at startup, so the registry is a plain map
//! built once; only the per-upstream counters mutate, through atomics. The
//! background prober feeds observations in, the `/health` endpoint and the
//! health gauge read the resulting status out. Thresholds add hysteresis:
//! one failed probe does not flip a healthy upstream and vice versa.
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU8, AtomicU32, Ordering},
};

use crate::{config::HealthStatus, metrics::set_upstream_health_status};

const STATUS_UNHEALTHY: u8 = 0;
const STATUS_HEALTHY: u8 = 1;

/// Tracks the probe-observed health of one upstream.
#[derive(Debug)]
pub struct UpstreamHealth {
    id: String,
    status: AtomicU8,
    consecutive_successes: AtomicU32,
    consecutive_failures: AtomicU32,
}

impl UpstreamHealth {
    /// New tracker, initialized healthy so traffic flows before the first
    /// probe completes.
    pub fn new(id: String) -> Self {
        Self {
            id,
            status: AtomicU8::new(STATUS_HEALTHY),
            consecutive_successes: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn status(&self) -> HealthStatus {
        if self.status.load(Ordering::Acquire) == STATUS_HEALTHY {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Record a successful probe; flips to healthy after `healthy_threshold`
    /// consecutive successes.
    pub fn observe_success(&self, healthy_threshold: u32) {
        self.consecutive_failures.store(0, Ordering::Release);
        let successes = self.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;

        if self.status() == HealthStatus::Unhealthy && successes >= healthy_threshold {
            self.status.store(STATUS_HEALTHY, Ordering::Release);
            set_upstream_health_status(&self.id, true);
            tracing::info!(
                "Upstream '{}' is healthy again after {successes} consecutive successful probes",
                self.id
            );
        }
    }

    /// Record a failed probe; flips to unhealthy after
    /// `unhealthy_threshold` consecutive failures.
    pub fn observe_failure(&self, unhealthy_threshold: u32, reason: &str) {
        self.consecutive_successes.store(0, Ordering::Release);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        if self.status() == HealthStatus::Healthy && failures >= unhealthy_threshold {
            self.status.store(STATUS_UNHEALTHY, Ordering::Release);
            set_upstream_health_status(&self.id, false);
            tracing::warn!(
                "Upstream '{}' marked unhealthy after {failures} consecutive failed probes: {reason}",
                self.id
            );
        }
    }
}

/// Immutable registry of health trackers, one per configured upstream.
pub struct HealthRegistry {
    upstreams: HashMap<String, UpstreamHealth>,
}

impl HealthRegistry {
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a String>) -> Self {
        let upstreams = ids
            .into_iter()
            .map(|id| (id.clone(), UpstreamHealth::new(id.clone())))
            .collect();
        Self { upstreams }
    }

    pub fn get(&self, id: &str) -> Option<&UpstreamHealth> {
        self.upstreams.get(id)
    }

    pub fn total_count(&self) -> usize {
        self.upstreams.len()
    }

    pub fn healthy_count(&self) -> usize {
        self.upstreams
            .values()
            .filter(|u| u.status() == HealthStatus::Healthy)
            .count()
    }

    /// Iterate ids and their current status.
    pub fn statuses(&self) -> impl Iterator<Item = (&str, HealthStatus)> {
        self.upstreams
            .iter()
            .map(|(id, health)| (id.as_str(), health.status()))
    }
}
