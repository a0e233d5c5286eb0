//! Gateway error taxonomy.
//!
//! Every component in the request pipeline returns `Result<_, GatewayError>`
//! instead of signalling HTTP failures through side channels. The outermost
//! handler performs the single translation from a variant to an HTTP status
//! and structured JSON body, so status-code policy lives in exactly one
//! place.
use axum::body::Body as AxumBody;
use hyper::{Response, StatusCode, header};
use thiserror::Error;

/// All failure modes a request can hit inside the gateway pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// No configured route prefix matches the request path.
    #[error("no route matches path: {path}")]
    RouteNotFound { path: String },

    /// A protected route was requested without a bearer token.
    #[error("authentication required")]
    AuthenticationRequired,

    /// A bearer token was present but failed verification.
    #[error("invalid bearer token: {reason}")]
    InvalidToken { reason: String },

    /// The verified caller lacks the admin role required by the route.
    #[error("admin access required")]
    InsufficientRole,

    /// The circuit breaker for the upstream is open; no call was attempted.
    #[error("upstream '{upstream}' is temporarily unavailable")]
    CircuitOpen { upstream: String },

    /// The upstream did not respond within its configured deadline.
    #[error("upstream '{upstream}' timed out after {timeout_secs}s")]
    UpstreamTimeout { upstream: String, timeout_secs: u64 },

    /// The upstream could not be reached at the transport level.
    #[error("upstream '{upstream}' unreachable: {reason}")]
    UpstreamUnreachable { upstream: String, reason: String },

    /// The upstream connection failed in some other transport-level way.
    #[error("upstream '{upstream}' protocol error: {reason}")]
    UpstreamProtocolError { upstream: String, reason: String },

    /// The client exceeded the rate limit for the requested surface.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Anything unexpected; logged and reported as 500, never swallowed.
    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code this error maps to at the boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::AuthenticationRequired | GatewayError::InvalidToken { .. } => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::InsufficientRole => StatusCode::FORBIDDEN,
            GatewayError::CircuitOpen { .. } | GatewayError::UpstreamUnreachable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamProtocolError { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable identifier used in the JSON error body.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::AuthenticationRequired => "authentication_required",
            GatewayError::InvalidToken { .. } => "invalid_token",
            GatewayError::InsufficientRole => "insufficient_role",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::UpstreamUnreachable { .. } => "upstream_unreachable",
            GatewayError::UpstreamProtocolError { .. } => "upstream_protocol_error",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// Upstream this error is attributed to, when the pipeline got that far.
    pub fn upstream(&self) -> Option<&str> {
        match self {
            GatewayError::CircuitOpen { upstream }
            | GatewayError::UpstreamTimeout { upstream, .. }
            | GatewayError::UpstreamUnreachable { upstream, .. }
            | GatewayError::UpstreamProtocolError { upstream, .. } => Some(upstream),
            _ => None,
        }
    }

    /// Whether this outcome counts as a circuit breaker failure. Only
    /// gateway-to-upstream connectivity failures do; upstream-reported HTTP
    /// errors and everything short-circuited before forwarding do not.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamTimeout { .. }
                | GatewayError::UpstreamUnreachable { .. }
                | GatewayError::UpstreamProtocolError { .. }
        )
    }

    /// Render the structured JSON error response for this variant.
    pub fn into_response(self) -> Response<AxumBody> {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json");

        if status == StatusCode::UNAUTHORIZED {
            builder = builder.header(header::WWW_AUTHENTICATE, "Bearer");
        }

        builder
            .body(AxumBody::from(body.to_string()))
            .unwrap_or_else(|_| {
                let mut fallback = Response::new(AxumBody::from("internal gateway error"));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}
