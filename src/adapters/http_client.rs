use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use http_body_util::BodyExt;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// HTTP client adapter using Hyper with Rustls (HTTP/1.1 + HTTP/2).
///
/// Responsibilities:
/// * Forces request version to HTTP/1.1 while allowing ALPN to negotiate h2
/// * Distinguishes connect failures from mid-flight protocol failures so the
///   forwarder can map them to 503 vs 502
/// * Performs GET based health probes with timeout
///
/// Per-call deadlines are not applied here; the forwarder owns the
/// per-upstream timeout so circuit breaker accounting stays in one place.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::debug!("Created upstream HTTP client (HTTP/1.1, ALPN h2)");
        Ok(Self { client })
    }

    /// Inject a consistent set of headers if absent (User-Agent, Accept).
    fn add_common_headers(req: &mut Request<AxumBody>) {
        let headers = req.headers_mut();
        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(
                header::USER_AGENT,
                header::HeaderValue::from_static("Portico-Gateway/1.0"),
            );
        }
        if !headers.contains_key(header::ACCEPT) {
            headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
        }
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::add_common_headers(&mut req);

        let client = self.client.clone();

        // Set Host header from the outbound URI so virtual-hosted upstreams
        // see the address they were actually called on.
        if let Some(host_str) = req.uri().host() {
            let host_header_val = if let Some(port) = req.uri().port() {
                HeaderValue::from_str(&format!("{host_str}:{}", port.as_u16()))
                    .unwrap_or_else(|_| HeaderValue::from_static(""))
            } else {
                HeaderValue::from_str(host_str).unwrap_or_else(|_| HeaderValue::from_static(""))
            };
            if !host_header_val.is_empty() {
                req.headers_mut().insert(header::HOST, host_header_val);
            }
        } else {
            return Err(HttpClientError::InvalidRequest(format!(
                "outgoing URI has no host: {}",
                req.uri()
            )));
        }

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;

        let method_for_error_log = parts.method.clone();
        let uri_for_error_log = parts.uri.clone();
        tracing::debug!(
            "Sending upstream request: {} {}",
            method_for_error_log,
            uri_for_error_log
        );

        let outgoing_request = Request::from_parts(parts, body);

        match client.request(outgoing_request).await {
            Ok(response) => {
                let (mut parts, hyper_body) = response.into_parts();

                // Remove Transfer-Encoding since the body is re-framed when
                // the gateway streams it back out.
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) if e.is_connect() => {
                tracing::debug!(
                    "Connect failure for {} {}: {}",
                    method_for_error_log,
                    uri_for_error_log,
                    e
                );
                Err(HttpClientError::ConnectionError(e.to_string()))
            }
            Err(e) => {
                tracing::debug!(
                    "Transport failure for {} {}: {}",
                    method_for_error_log,
                    uri_for_error_log,
                    e
                );
                Err(HttpClientError::ProtocolError(e.to_string()))
            }
        }
    }

    async fn health_check(&self, url: &str, timeout_secs: u64) -> HttpClientResult<bool> {
        let client = self.client.clone();

        let request = Request::builder()
            .method("GET")
            .uri(url)
            .version(Version::HTTP_11)
            .body(AxumBody::empty())
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;

        let timeout_duration = Duration::from_secs(timeout_secs);

        match timeout(timeout_duration, client.request(request)).await {
            Ok(result) => match result {
                Ok(response) => {
                    let is_healthy = response.status().is_success();
                    // Consume the body so the connection can be reused.
                    let _ = response.into_body().collect().await;
                    Ok(is_healthy)
                }
                Err(err) => {
                    tracing::debug!("Health probe error for {}: {}", url, err);
                    Ok(false)
                }
            },
            Err(_) => {
                tracing::debug!("Health probe timeout for {}", url);
                Err(HttpClientError::Timeout(timeout_secs))
            }
        }
    }
}
