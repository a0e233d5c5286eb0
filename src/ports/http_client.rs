use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Transport-level failures when talking to an upstream service.
///
/// The variants deliberately mirror the gateway's upstream error taxonomy:
/// the forwarder maps `ConnectionError` to 503, `Timeout` to 504 and
/// `ProtocolError` to 502 without inspecting error strings.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// The upstream could not be reached (refused, DNS failure, reset
    /// during connect).
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// The upstream did not answer within the allotted deadline.
    #[error("timeout after {0} seconds")]
    Timeout(u64),

    /// The request could not even be constructed or sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The connection was established but the exchange failed mid-flight.
    #[error("protocol error: {0}")]
    ProtocolError(String),
}

/// Result type alias for HTTP client operations.
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for making HTTP requests to
/// upstream services. The gateway core only ever talks to upstreams through
/// this trait, which keeps the forwarding pipeline testable with a stub.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to an upstream server.
    ///
    /// The request URI must be absolute (scheme + authority). Any HTTP
    /// response, including 4xx/5xx from the upstream, is a successful
    /// round trip from this port's point of view.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;

    /// Probe an upstream health endpoint.
    ///
    /// Returns `Ok(true)` when the endpoint answered with a success status,
    /// `Ok(false)` when it answered with anything else or was unreachable,
    /// and `Err(Timeout)` when the probe exceeded `timeout_secs`.
    async fn health_check(&self, url: &str, timeout_secs: u64) -> HttpClientResult<bool>;
}
