use std::{collections::HashMap, sync::Arc, time::Duration};

use eyre::Result;
use tokio::time::sleep;

use crate::{
    config::models::{HealthCheckConfig, UpstreamConfig},
    core::upstream::HealthRegistry,
    ports::http_client::HttpClient,
};

/// Periodic health prober for all configured upstreams.
///
/// Runs as a single owned tokio task started at boot and aborted during
/// graceful shutdown. Each cycle probes every upstream's health endpoint
/// with a bounded timeout and feeds the outcome into the shared
/// [`HealthRegistry`], whose thresholds decide when status actually flips.
pub struct HealthChecker {
    registry: Arc<HealthRegistry>,
    upstreams: HashMap<String, UpstreamConfig>,
    config: HealthCheckConfig,
    http_client: Arc<dyn HttpClient>,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<HealthRegistry>,
        upstreams: HashMap<String, UpstreamConfig>,
        config: HealthCheckConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            registry,
            upstreams,
            config,
            http_client,
        }
    }

    /// Run the probe loop until the owning task is aborted.
    pub async fn run(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("Upstream health checking is disabled");
            return Ok(());
        }

        let interval = Duration::from_secs(self.config.interval_secs);
        tracing::info!(
            "Starting upstream health checker: interval {}s, timeout {}s, {} upstreams",
            self.config.interval_secs,
            self.config.timeout_secs,
            self.upstreams.len()
        );

        loop {
            // Sleep first so the server is accepting before the first cycle.
            sleep(interval).await;
            self.run_cycle().await;
        }
    }

    /// Probe every upstream once.
    async fn run_cycle(&self) {
        for (id, upstream) in &self.upstreams {
            let Some(health) = self.registry.get(id) else {
                continue;
            };

            let probe_url = upstream.health_url();
            match self
                .http_client
                .health_check(&probe_url, self.config.timeout_secs)
                .await
            {
                Ok(true) => health.observe_success(self.config.healthy_threshold),
                Ok(false) => health.observe_failure(
                    self.config.unhealthy_threshold,
                    "probe returned non-success status",
                ),
                Err(err) => health.observe_failure(
                    self.config.unhealthy_threshold,
                    &format!("probe error: {err}"),
                ),
            }
        }

        tracing::debug!(
            "Health check cycle completed: {}/{} upstreams healthy",
            self.registry.healthy_count(),
            self.registry.total_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use axum::body::Body as AxumBody;
    use hyper::{Request, Response};

    use super::*;
    use crate::ports::http_client::HttpClientResult;

    /// Probe stub that fails for URLs containing a marker substring.
    struct FlakyProbeClient {
        failing_marker: &'static str,
        probes: AtomicU32,
    }

    #[async_trait]
    impl HttpClient for FlakyProbeClient {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            unimplemented!("health checker never forwards requests")
        }

        async fn health_check(&self, url: &str, _timeout_secs: u64) -> HttpClientResult<bool> {
            self.probes.fetch_add(1, Ordering::Relaxed);
            Ok(!url.contains(self.failing_marker))
        }
    }

    fn upstreams() -> HashMap<String, UpstreamConfig> {
        let mut map = HashMap::new();
        for (id, port) in [("user", 8001), ("order", 8003)] {
            map.insert(
                id.to_string(),
                UpstreamConfig {
                    base_url: format!("http://localhost:{port}"),
                    timeout_secs: 30,
                    health_path: "/health".to_string(),
                },
            );
        }
        map
    }

    #[tokio::test]
    async fn test_cycle_flips_failing_upstream_after_threshold() {
        let upstreams = upstreams();
        let registry = Arc::new(HealthRegistry::new(upstreams.keys()));
        let client = Arc::new(FlakyProbeClient {
            failing_marker: "8003",
            probes: AtomicU32::new(0),
        });
        let config = HealthCheckConfig {
            enabled: true,
            interval_secs: 1,
            timeout_secs: 1,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        };
        let checker = HealthChecker::new(registry.clone(), upstreams, config, client.clone());

        checker.run_cycle().await;
        checker.run_cycle().await;
        assert_eq!(registry.healthy_count(), 2);

        checker.run_cycle().await;
        assert_eq!(registry.healthy_count(), 1);
        assert_eq!(
            registry.get("order").unwrap().status().to_string(),
            "unhealthy"
        );
        // Two upstreams probed per cycle.
        assert_eq!(client.probes.load(Ordering::Relaxed), 6);
    }
}
