//! Request forwarding to upstream services.
//!
//! The forwarder is only invoked after the breaker pre-check has passed. It
//! rewrites the request URI onto the upstream's base URL, strips the
//! hop-by-hop `Host` header, injects gateway-asserted identity headers, and
//! issues exactly one attempt bounded by the upstream's configured timeout.
//! Breaker accounting happens here and nowhere else: any completed round
//! trip (whatever the upstream's status code) records a success, while
//! timeouts, connect failures and other transport errors record a failure.
use std::{sync::Arc, time::Instant};

use axum::body::Body as AxumBody;
use hyper::{Request, Response, header, header::HeaderValue};
use tokio::time::timeout;

use crate::{
    config::models::UpstreamConfig,
    core::{
        CircuitBreakerRegistry,
        auth::CallerIdentity,
        error::GatewayError,
    },
    metrics,
    ports::http_client::{HttpClient, HttpClientError},
};

/// Identity header carrying the authenticated user id toward upstreams.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Identity header carrying the authenticated role toward upstreams.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Single-attempt upstream forwarder with breaker accounting.
pub struct Forwarder {
    http_client: Arc<dyn HttpClient>,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl Forwarder {
    pub fn new(http_client: Arc<dyn HttpClient>, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            http_client,
            breakers,
        }
    }

    /// Forward `req` to the upstream and relay its response verbatim.
    ///
    /// The caller guarantees the breaker for `upstream_id` was closed when
    /// this is invoked; this method performs the post-attempt update.
    pub async fn forward(
        &self,
        req: Request<AxumBody>,
        upstream_id: &str,
        upstream: &UpstreamConfig,
        identity: Option<&CallerIdentity>,
    ) -> Result<Response<AxumBody>, GatewayError> {
        let method = req.method().clone();
        let outbound = Self::build_outbound_request(req, upstream, identity)?;

        let started = Instant::now();
        let attempt = timeout(upstream.timeout(), self.http_client.send_request(outbound)).await;
        let elapsed = started.elapsed();

        match attempt {
            Err(_) => {
                self.breakers.record_failure(upstream_id).await;
                tracing::error!(
                    "Upstream '{upstream_id}' timed out after {}s",
                    upstream.timeout_secs
                );
                Err(GatewayError::UpstreamTimeout {
                    upstream: upstream_id.to_string(),
                    timeout_secs: upstream.timeout_secs,
                })
            }
            Ok(Err(HttpClientError::Timeout(timeout_secs))) => {
                self.breakers.record_failure(upstream_id).await;
                Err(GatewayError::UpstreamTimeout {
                    upstream: upstream_id.to_string(),
                    timeout_secs,
                })
            }
            Ok(Err(HttpClientError::ConnectionError(reason))) => {
                self.breakers.record_failure(upstream_id).await;
                tracing::error!("Upstream '{upstream_id}' unreachable: {reason}");
                Err(GatewayError::UpstreamUnreachable {
                    upstream: upstream_id.to_string(),
                    reason,
                })
            }
            Ok(Err(err)) => {
                self.breakers.record_failure(upstream_id).await;
                tracing::error!("Upstream '{upstream_id}' transport error: {err}");
                Err(GatewayError::UpstreamProtocolError {
                    upstream: upstream_id.to_string(),
                    reason: err.to_string(),
                })
            }
            Ok(Ok(response)) => {
                // A completed round trip is a breaker success even when the
                // upstream reported 4xx/5xx.
                self.breakers.record_success(upstream_id).await;
                metrics::increment_upstream_request_total(
                    upstream_id,
                    method.as_str(),
                    response.status().as_u16(),
                );
                metrics::record_upstream_request_duration(upstream_id, elapsed);
                Ok(response)
            }
        }
    }

    /// Rebuild the inbound request for the upstream: base URL + original
    /// path and query, all headers except `Host`, identity headers appended.
    fn build_outbound_request(
        req: Request<AxumBody>,
        upstream: &UpstreamConfig,
        identity: Option<&CallerIdentity>,
    ) -> Result<Request<AxumBody>, GatewayError> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map_or("", |pq| pq.as_str())
            .to_string();
        let outbound_url = format!("{}{}", upstream.base_url, path_and_query);

        let (mut parts, body) = req.into_parts();
        parts.uri = outbound_url.parse().map_err(|e| {
            GatewayError::Internal(format!("outbound URL '{outbound_url}' invalid: {e}"))
        })?;

        parts.headers.remove(header::HOST);

        if let Some(identity) = identity {
            let user_id = HeaderValue::from_str(&identity.user_id).map_err(|_| {
                GatewayError::Internal("caller user id not header-safe".to_string())
            })?;
            let role = HeaderValue::from_str(&identity.role)
                .map_err(|_| GatewayError::Internal("caller role not header-safe".to_string()))?;
            parts.headers.insert(USER_ID_HEADER, user_id);
            parts.headers.insert(USER_ROLE_HEADER, role);
        }

        Ok(Request::from_parts(parts, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> UpstreamConfig {
        UpstreamConfig {
            base_url: "http://localhost:8003".to_string(),
            timeout_secs: 30,
            health_path: "/health".to_string(),
        }
    }

    fn identity() -> CallerIdentity {
        CallerIdentity {
            user_id: "u-42".to_string(),
            username: Some("alice".to_string()),
            role: "user".to_string(),
            token_expiry: 0,
        }
    }

    #[test]
    fn test_outbound_url_preserves_path_and_query() {
        let req = Request::builder()
            .uri("/api/v1/orders/7?verbose=1")
            .body(AxumBody::empty())
            .unwrap();

        let outbound = Forwarder::build_outbound_request(req, &upstream(), None).unwrap();
        assert_eq!(
            outbound.uri().to_string(),
            "http://localhost:8003/api/v1/orders/7?verbose=1"
        );
    }

    #[test]
    fn test_host_header_is_stripped() {
        let req = Request::builder()
            .uri("/api/v1/orders")
            .header(header::HOST, "gateway.example.com")
            .header("x-custom", "kept")
            .body(AxumBody::empty())
            .unwrap();

        let outbound = Forwarder::build_outbound_request(req, &upstream(), None).unwrap();
        assert!(outbound.headers().get(header::HOST).is_none());
        assert_eq!(outbound.headers().get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn test_identity_headers_injected_when_authenticated() {
        let req = Request::builder()
            .uri("/api/v1/orders")
            .body(AxumBody::empty())
            .unwrap();

        let identity = identity();
        let outbound =
            Forwarder::build_outbound_request(req, &upstream(), Some(&identity)).unwrap();
        assert_eq!(outbound.headers().get(USER_ID_HEADER).unwrap(), "u-42");
        assert_eq!(outbound.headers().get(USER_ROLE_HEADER).unwrap(), "user");
    }

    #[test]
    fn test_no_identity_headers_for_anonymous_requests() {
        let req = Request::builder()
            .uri("/api/v1/products")
            .body(AxumBody::empty())
            .unwrap();

        let outbound = Forwarder::build_outbound_request(req, &upstream(), None).unwrap();
        assert!(outbound.headers().get(USER_ID_HEADER).is_none());
        assert!(outbound.headers().get(USER_ROLE_HEADER).is_none());
    }
}
