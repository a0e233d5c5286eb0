//! Per-upstream circuit breaking over shared state.
//!
//! Breaker records live in the shared state store (one hash per upstream)
//! so every gateway instance sees the same failure history. An upstream is
//! open once it has accumulated `failure_threshold` failures and the most
//! recent one is still inside the open window; recovery is a hard cutover —
//! when the window elapses the record is discarded lazily on the next
//! check and the very next request is allowed straight through. There is no
//! half-open probe state.
use std::{sync::Arc, time::Duration};

use crate::{metrics, ports::state_store::StateStore};

const FAILURES_FIELD: &str = "failures";
const LAST_FAILURE_FIELD: &str = "last_failure";

/// Thresholds governing open/closed transitions.
#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    /// Consecutive failures needed to open the breaker.
    pub failure_threshold: i64,
    /// How long the breaker stays open after the last failure.
    pub open_window: Duration,
    /// TTL on the stored record, a GC safeguard independent of the window.
    pub record_ttl: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_window: Duration::from_secs(60),
            record_ttl: Duration::from_secs(300),
        }
    }
}

/// Registry of breaker states, one logical record per upstream id.
///
/// All mutation goes through atomic store operations so concurrent requests
/// (and concurrent gateway instances) never lose increments. Store errors
/// are logged and treated as "closed": a broken state backend must not take
/// down forwarding.
pub struct CircuitBreakerRegistry {
    store: Arc<dyn StateStore>,
    policy: BreakerPolicy,
}

impl CircuitBreakerRegistry {
    pub fn new(store: Arc<dyn StateStore>, policy: BreakerPolicy) -> Self {
        Self { store, policy }
    }

    fn record_key(upstream: &str) -> String {
        format!("circuit_breaker:{upstream}")
    }

    fn now_secs() -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }

    /// Whether forwarding to `upstream` is currently rejected.
    ///
    /// A record whose open window has elapsed is deleted here (lazy expiry)
    /// and reported closed.
    pub async fn is_open(&self, upstream: &str) -> bool {
        let key = Self::record_key(upstream);

        let state = match self.store.hash_get_all(&key).await {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!("Breaker state read failed for '{upstream}': {err}");
                return false;
            }
        };

        if state.is_empty() {
            return false;
        }

        let failures: i64 = state
            .get(FAILURES_FIELD)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let last_failure: f64 = state
            .get(LAST_FAILURE_FIELD)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0.0);

        let elapsed = Self::now_secs() - last_failure;
        let window = self.policy.open_window.as_secs_f64();

        if failures >= self.policy.failure_threshold && elapsed < window {
            return true;
        }

        if elapsed >= window {
            if let Err(err) = self.store.delete(&key).await {
                tracing::warn!("Breaker state cleanup failed for '{upstream}': {err}");
            }
        }

        false
    }

    /// A completed round trip: clear the failure record outright.
    pub async fn record_success(&self, upstream: &str) {
        let key = Self::record_key(upstream);
        if let Err(err) = self.store.delete(&key).await {
            tracing::warn!("Breaker success reset failed for '{upstream}': {err}");
        }
    }

    /// A connectivity failure: bump the counter and refresh the timestamp.
    pub async fn record_failure(&self, upstream: &str) {
        let key = Self::record_key(upstream);

        let failures = match self.store.hash_incr(&key, FAILURES_FIELD, 1).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!("Breaker failure increment failed for '{upstream}': {err}");
                return;
            }
        };

        let now = format!("{:.3}", Self::now_secs());
        if let Err(err) = self.store.hash_set(&key, LAST_FAILURE_FIELD, &now).await {
            tracing::warn!("Breaker timestamp update failed for '{upstream}': {err}");
        }
        if let Err(err) = self.store.expire(&key, self.policy.record_ttl).await {
            tracing::warn!("Breaker record TTL refresh failed for '{upstream}': {err}");
        }

        if failures == self.policy.failure_threshold {
            metrics::increment_breaker_opened(upstream);
            tracing::warn!(
                "Circuit breaker opened for upstream '{upstream}' after {failures} failures"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemoryStore;

    fn registry(store: Arc<MemoryStore>) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(store, BreakerPolicy::default())
    }

    #[tokio::test]
    async fn test_breaker_starts_closed() {
        let store = Arc::new(MemoryStore::new());
        let breaker = registry(store);
        assert!(!breaker.is_open("order").await);
    }

    #[tokio::test]
    async fn test_breaker_opens_at_threshold() {
        let store = Arc::new(MemoryStore::new());
        let breaker = registry(store);

        for _ in 0..4 {
            breaker.record_failure("order").await;
        }
        assert!(!breaker.is_open("order").await);

        breaker.record_failure("order").await;
        assert!(breaker.is_open("order").await);
    }

    #[tokio::test]
    async fn test_success_clears_failure_history() {
        let store = Arc::new(MemoryStore::new());
        let breaker = registry(store);

        for _ in 0..4 {
            breaker.record_failure("order").await;
        }
        breaker.record_success("order").await;
        for _ in 0..4 {
            breaker.record_failure("order").await;
        }

        // The reset means the count never reached 5 consecutively.
        assert!(!breaker.is_open("order").await);
    }

    #[tokio::test]
    async fn test_breaker_closes_after_window_elapses() {
        let store = Arc::new(MemoryStore::new());
        let breaker = registry(store.clone());

        for _ in 0..5 {
            breaker.record_failure("order").await;
        }
        assert!(breaker.is_open("order").await);

        // Rewind the recorded timestamp past the open window.
        let stale = CircuitBreakerRegistry::now_secs() - 61.0;
        store
            .hash_set(
                "circuit_breaker:order",
                LAST_FAILURE_FIELD,
                &format!("{stale:.3}"),
            )
            .await
            .unwrap();

        assert!(!breaker.is_open("order").await);
        // Lazy expiry dropped the record entirely.
        let state = store.hash_get_all("circuit_breaker:order").await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_breakers_are_independent_per_upstream() {
        let store = Arc::new(MemoryStore::new());
        let breaker = registry(store);

        for _ in 0..5 {
            breaker.record_failure("order").await;
        }
        assert!(breaker.is_open("order").await);
        assert!(!breaker.is_open("product").await);
    }
}
