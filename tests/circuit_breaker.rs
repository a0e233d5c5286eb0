// Breaker behaviour through the full pipeline: opening, fast-fail, window
// expiry and success resets, driven by a switchable stub upstream.
#[cfg(test)]
mod test {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicU32, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use hyper::{Request, Response, StatusCode};
    use portico::{
        StateStore,
        adapters::{HttpHandler, MemoryStore},
        config::models::{GatewayConfig, StateBackend, UpstreamConfig},
        core::upstream::HealthRegistry,
        ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    };

    /// Stub upstream that can be switched between refusing connections and
    /// answering 200.
    struct FlakyUpstream {
        failing: AtomicBool,
        calls: AtomicU32,
    }

    impl FlakyUpstream {
        fn new(failing: bool) -> Arc<Self> {
            Arc::new(Self {
                failing: AtomicBool::new(failing),
                calls: AtomicU32::new(0),
            })
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpClient for FlakyUpstream {
        async fn send_request(&self, _req: Request<Body>) -> HttpClientResult<Response<Body>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(HttpClientError::ConnectionError(
                    "connection refused".to_string(),
                ))
            } else {
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap())
            }
        }

        async fn health_check(&self, _url: &str, _timeout_secs: u64) -> HttpClientResult<bool> {
            Ok(!self.failing.load(Ordering::SeqCst))
        }
    }

    /// Stub upstream that never answers inside the forwarding deadline.
    struct StalledUpstream {
        calls: AtomicU32,
    }

    #[async_trait]
    impl HttpClient for StalledUpstream {
        async fn send_request(&self, _req: Request<Body>) -> HttpClientResult<Response<Body>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("the forwarder deadline fires first")
        }

        async fn health_check(&self, _url: &str, _timeout_secs: u64) -> HttpClientResult<bool> {
            Ok(true)
        }
    }

    fn test_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = "breaker-test-secret".to_string();
        config.state.backend = StateBackend::Memory;
        config.upstreams.insert(
            "product".to_string(),
            UpstreamConfig {
                base_url: "http://localhost:8002".to_string(),
                timeout_secs: 1,
                health_path: "/health".to_string(),
            },
        );
        config
            .routes
            .insert("/api/v1/products".to_string(), "product".to_string());
        config
    }

    fn build_handler(client: Arc<dyn HttpClient>, store: Arc<MemoryStore>) -> HttpHandler {
        let config = Arc::new(test_config());
        let health = Arc::new(HealthRegistry::new(config.upstreams.keys()));
        HttpHandler::new(config, client, store, health).unwrap()
    }

    async fn send(handler: &HttpHandler) -> Response<Body> {
        let addr: SocketAddr = "10.9.8.7:41000".parse().unwrap();
        let req = Request::builder()
            .method("GET")
            .uri("/api/v1/products")
            .body(Body::empty())
            .unwrap();
        handler.handle_request(req, Some(addr)).await
    }

    async fn error_kind(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        parsed["error"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_five_failures_open_the_breaker() {
        let upstream = FlakyUpstream::new(true);
        let store = Arc::new(MemoryStore::new());
        let handler = build_handler(upstream.clone(), store.clone());

        for _ in 0..5 {
            let response = send(&handler).await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(error_kind(response).await, "upstream_unreachable");
        }
        assert_eq!(upstream.call_count(), 5);

        // Sixth request fast-fails without touching the upstream.
        let response = send(&handler).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_kind(response).await, "circuit_open");
        assert_eq!(upstream.call_count(), 5);
    }

    #[tokio::test]
    async fn test_breaker_recovers_after_window_elapses() {
        let upstream = FlakyUpstream::new(true);
        let store = Arc::new(MemoryStore::new());
        let handler = build_handler(upstream.clone(), store.clone());

        for _ in 0..5 {
            send(&handler).await;
        }
        let response = send(&handler).await;
        assert_eq!(error_kind(response).await, "circuit_open");
        assert_eq!(upstream.call_count(), 5);

        // Rewind the recorded failure time past the 60 second window.
        let stale = chrono::Utc::now().timestamp_millis() as f64 / 1000.0 - 61.0;
        store
            .hash_set("circuit_breaker:product", "last_failure", &format!("{stale:.3}"))
            .await
            .unwrap();

        // Hard cutover: the very next request goes straight through.
        upstream.set_failing(false);
        let response = send(&handler).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(upstream.call_count(), 6);
    }

    #[tokio::test]
    async fn test_one_success_resets_the_failure_count() {
        let upstream = FlakyUpstream::new(true);
        let store = Arc::new(MemoryStore::new());
        let handler = build_handler(upstream.clone(), store.clone());

        for _ in 0..4 {
            send(&handler).await;
        }

        upstream.set_failing(false);
        let response = send(&handler).await;
        assert_eq!(response.status(), StatusCode::OK);

        upstream.set_failing(true);
        for _ in 0..4 {
            send(&handler).await;
        }

        // 4 + 4 failures with a reset in between never reach the threshold:
        // the next request still goes to the upstream instead of fast-failing.
        let response = send(&handler).await;
        assert_eq!(error_kind(response).await, "upstream_unreachable");
        assert_eq!(upstream.call_count(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_upstream_times_out_and_counts_as_failure() {
        let upstream = Arc::new(StalledUpstream {
            calls: AtomicU32::new(0),
        });
        let store = Arc::new(MemoryStore::new());
        let handler = build_handler(upstream.clone(), store.clone());

        let response = send(&handler).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(error_kind(response).await, "upstream_timeout");
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

        let state = store.hash_get_all("circuit_breaker:product").await.unwrap();
        assert_eq!(state.get("failures").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_upstream_http_errors_do_not_trip_the_breaker() {
        /// Always answers, but only with 500s.
        struct GrumpyUpstream;

        #[async_trait]
        impl HttpClient for GrumpyUpstream {
            async fn send_request(
                &self,
                _req: Request<Body>,
            ) -> HttpClientResult<Response<Body>> {
                Ok(Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("upstream exploded"))
                    .unwrap())
            }

            async fn health_check(
                &self,
                _url: &str,
                _timeout_secs: u64,
            ) -> HttpClientResult<bool> {
                Ok(false)
            }
        }

        let store = Arc::new(MemoryStore::new());
        let handler = build_handler(Arc::new(GrumpyUpstream), store.clone());

        // A completed round trip is not a connectivity failure, so even many
        // 500s never open the breaker and the status is relayed verbatim.
        for _ in 0..10 {
            let response = send(&handler).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }

        let state = store.hash_get_all("circuit_breaker:product").await.unwrap();
        assert!(state.is_empty());
    }
}
