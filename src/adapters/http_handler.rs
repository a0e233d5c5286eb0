//! Inbound HTTP handling for the Portico gateway.
//!
//! One handler instance serves every inbound request. A few reserved GET
//! endpoints (liveness, service health fan-out, admin analytics, rate-limit
//! info) are answered locally; everything else runs the forwarding
//! pipeline: route → authorize → breaker pre-check → forward → breaker
//! post-update → relay. Whatever branch a request takes, the outcome is
//! logged to analytics and the two gateway headers are appended before the
//! response leaves.
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Instant,
};

use axum::body::Body as AxumBody;
use axum::http::request::Parts;
use futures_util::future::join_all;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, header};
use tracing::Instrument;

use crate::{
    adapters::{
        analytics::{RequestAnalytics, RequestLogEntry},
        forwarder::Forwarder,
    },
    config::models::{GatewayConfig, RateLimitsConfig},
    core::{
        AccessController, CircuitBreakerRegistry, GatewayError, RouteTable, SurfaceLimiter,
        auth::CallerIdentity, upstream::HealthRegistry,
    },
    metrics,
    ports::{http_client::HttpClient, state_store::StateStore},
    tracing_setup,
};

/// Response header identifying the gateway.
pub const GATEWAY_HEADER: &str = "x-gateway";
/// Response header carrying the measured round-trip time in seconds.
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

const GATEWAY_NAME: &str = "portico";

/// One rate limiter per inbound surface.
struct SurfaceLimiters {
    default: SurfaceLimiter,
    health_services: SurfaceLimiter,
    analytics_stats: SurfaceLimiter,
    analytics_logs: SurfaceLimiter,
    rate_limit_info: SurfaceLimiter,
}

impl SurfaceLimiters {
    fn from_config(config: &RateLimitsConfig) -> Result<Self, String> {
        Ok(Self {
            default: SurfaceLimiter::new(&config.default)?,
            health_services: SurfaceLimiter::new(&config.health_services)?,
            analytics_stats: SurfaceLimiter::new(&config.analytics_stats)?,
            analytics_logs: SurfaceLimiter::new(&config.analytics_logs)?,
            rate_limit_info: SurfaceLimiter::new(&config.rate_limit_info)?,
        })
    }
}

/// How a request was answered: proxied through the pipeline (logged to
/// analytics) or served by a reserved endpoint (not logged).
enum Handled {
    Proxied {
        response: Response<AxumBody>,
        upstream: Option<String>,
    },
    Endpoint(Response<AxumBody>),
}

/// HTTP handler for the Portico gateway.
pub struct HttpHandler {
    config: Arc<GatewayConfig>,
    routes: RouteTable,
    access: AccessController,
    breakers: Arc<CircuitBreakerRegistry>,
    forwarder: Forwarder,
    analytics: RequestAnalytics,
    health: Arc<HealthRegistry>,
    http_client: Arc<dyn HttpClient>,
    limiters: SurfaceLimiters,
}

impl HttpHandler {
    pub fn new(
        config: Arc<GatewayConfig>,
        http_client: Arc<dyn HttpClient>,
        store: Arc<dyn StateStore>,
        health: Arc<HealthRegistry>,
    ) -> eyre::Result<Self> {
        let routes = RouteTable::new(&config.routes);
        let access = AccessController::new(
            &config.auth.jwt_secret,
            config.protected_routes.clone(),
            config.admin_routes.clone(),
        );
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            store.clone(),
            config.breaker.policy(),
        ));
        let forwarder = Forwarder::new(http_client.clone(), breakers.clone());
        let analytics = RequestAnalytics::new(store);
        let limiters = SurfaceLimiters::from_config(&config.rate_limits)
            .map_err(|e| eyre::eyre!("invalid rate limit configuration: {e}"))?;

        Ok(Self {
            config,
            routes,
            access,
            breakers,
            forwarder,
            analytics,
            health,
            http_client,
            limiters,
        })
    }

    /// Serve one inbound request end to end. Never panics the serving loop:
    /// every pipeline error becomes a structured JSON response here.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing_setup::create_request_span(method.as_str(), &path, &request_id);

        let outcome = self
            .dispatch(req, client_addr)
            .instrument(span.clone())
            .await;

        let (mut response, upstream, log_to_analytics) = match outcome {
            Ok(Handled::Proxied { response, upstream }) => (response, upstream, true),
            Ok(Handled::Endpoint(response)) => (response, None, false),
            Err(err) => {
                let upstream = err.upstream().map(str::to_string);
                if matches!(err, GatewayError::Internal(_)) {
                    tracing::error!("Gateway pipeline error: {err}");
                }
                (err.into_response(), upstream, true)
            }
        };

        let elapsed = started.elapsed();
        let status = response.status();
        span.record("http.status_code", status.as_u16());
        span.record("duration_ms", elapsed.as_millis() as u64);

        metrics::increment_request_total(method.as_str(), status.as_u16(), upstream.as_deref());
        metrics::record_request_duration(method.as_str(), elapsed);

        let headers = response.headers_mut();
        headers.insert(
            GATEWAY_HEADER,
            header::HeaderValue::from_static(GATEWAY_NAME),
        );
        if let Ok(value) = header::HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64()))
        {
            headers.insert(RESPONSE_TIME_HEADER, value);
        }

        if log_to_analytics {
            let entry = RequestLogEntry {
                timestamp: chrono::Utc::now().to_rfc3339(),
                method: method.to_string(),
                path,
                query,
                status_code: status.as_u16(),
                response_time: elapsed.as_secs_f64(),
                upstream,
                client_ip: client_addr.map(|addr| addr.ip().to_string()),
                user_agent,
            };
            self.analytics.record(&entry).await;
        }

        response
    }

    /// Route to a reserved endpoint or the forwarding pipeline.
    async fn dispatch(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Handled, GatewayError> {
        let client_ip = client_addr.map(|addr| addr.ip());
        let path = req.uri().path().to_string();

        let reserved = matches!(
            path.as_str(),
            "/health" | "/health/services" | "/analytics/stats" | "/analytics/logs"
                | "/rate-limit/info"
        );

        if reserved {
            let (parts, _body) = req.into_parts();
            if parts.method != Method::GET {
                return Ok(Handled::Endpoint(Self::method_not_allowed()));
            }
            let response = match path.as_str() {
                "/health" => self.handle_health(),
                "/health/services" => self.handle_services_health(client_ip).await,
                "/analytics/stats" => self.handle_analytics_stats(&parts, client_ip).await,
                "/analytics/logs" => self.handle_analytics_logs(&parts, client_ip).await,
                "/rate-limit/info" => self.handle_rate_limit_info(client_ip),
                _ => unreachable!(),
            };
            return Ok(Handled::Endpoint(
                response.unwrap_or_else(|err| err.into_response()),
            ));
        }

        let (response, upstream) = self.handle_proxy(req, client_ip).await?;
        Ok(Handled::Proxied {
            response,
            upstream: Some(upstream),
        })
    }

    /// The forwarding pipeline: rate limit → route → authorize → breaker →
    /// forward. Strictly sequential within one request.
    async fn handle_proxy(
        &self,
        req: Request<AxumBody>,
        client_ip: Option<IpAddr>,
    ) -> Result<(Response<AxumBody>, String), GatewayError> {
        self.limiters.default.check(client_ip)?;

        let path = req.uri().path();
        let upstream_id = self
            .routes
            .resolve(path)
            .ok_or_else(|| GatewayError::RouteNotFound {
                path: path.to_string(),
            })?
            .to_string();

        let bearer = bearer_token(req.headers());
        let identity = self.access.authorize(path, bearer.as_deref())?;

        if self.breakers.is_open(&upstream_id).await {
            return Err(GatewayError::CircuitOpen {
                upstream: upstream_id,
            });
        }

        let upstream = self
            .config
            .upstreams
            .get(&upstream_id)
            .ok_or_else(|| {
                GatewayError::Internal(format!("upstream '{upstream_id}' not configured"))
            })?;

        let response = self
            .forwarder
            .forward(req, &upstream_id, upstream, identity.as_ref())
            .await?;

        Ok((response, upstream_id))
    }

    /// Gateway liveness plus cached upstream health counts.
    fn handle_health(&self) -> Result<Response<AxumBody>, GatewayError> {
        let body = serde_json::json!({
            "status": "healthy",
            "service": "portico-gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "upstreams": {
                "healthy": self.health.healthy_count(),
                "total": self.health.total_count(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        json_response(StatusCode::OK, &body)
    }

    /// Live fan-out probe of every upstream's health endpoint.
    async fn handle_services_health(
        &self,
        client_ip: Option<IpAddr>,
    ) -> Result<Response<AxumBody>, GatewayError> {
        self.limiters.health_services.check(client_ip)?;

        let timeout_secs = self.config.health_check.timeout_secs;
        let probes = self.config.upstreams.iter().map(|(id, upstream)| {
            let probe_url = upstream.health_url();
            let client = self.http_client.clone();
            async move {
                let started = Instant::now();
                let report = match client.health_check(&probe_url, timeout_secs).await {
                    Ok(is_healthy) => serde_json::json!({
                        "status": if is_healthy { "healthy" } else { "unhealthy" },
                        "response_time": started.elapsed().as_secs_f64(),
                    }),
                    Err(err) => serde_json::json!({
                        "status": "unreachable",
                        "error": err.to_string(),
                    }),
                };
                (id.clone(), report)
            }
        });

        let services: serde_json::Map<String, serde_json::Value> = join_all(probes)
            .await
            .into_iter()
            .map(|(id, report)| (id, report))
            .collect();

        let body = serde_json::json!({
            "gateway": "healthy",
            "services": services,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        json_response(StatusCode::OK, &body)
    }

    /// Admin-only daily counters for the trailing N days.
    async fn handle_analytics_stats(
        &self,
        parts: &Parts,
        client_ip: Option<IpAddr>,
    ) -> Result<Response<AxumBody>, GatewayError> {
        self.limiters.analytics_stats.check(client_ip)?;
        self.require_admin(&parts.headers)?;

        let days = query_param(parts, "days")
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(7)
            .clamp(1, 30);

        let stats = self
            .analytics
            .daily_stats(days)
            .await
            .map_err(|err| GatewayError::Internal(format!("analytics read failed: {err}")))?;

        let body = serde_json::json!({
            "stats": stats,
            "period_days": days,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        json_response(StatusCode::OK, &body)
    }

    /// Admin-only recent request log.
    async fn handle_analytics_logs(
        &self,
        parts: &Parts,
        client_ip: Option<IpAddr>,
    ) -> Result<Response<AxumBody>, GatewayError> {
        self.limiters.analytics_logs.check(client_ip)?;
        self.require_admin(&parts.headers)?;

        let limit = query_param(parts, "limit")
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(100)
            .clamp(1, 1000);

        let logs = self
            .analytics
            .recent_logs(limit)
            .await
            .map_err(|err| GatewayError::Internal(format!("analytics read failed: {err}")))?;

        let body = serde_json::json!({
            "count": logs.len(),
            "logs": logs,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        json_response(StatusCode::OK, &body)
    }

    /// Echo the static rate-limit tiers.
    fn handle_rate_limit_info(
        &self,
        client_ip: Option<IpAddr>,
    ) -> Result<Response<AxumBody>, GatewayError> {
        self.limiters.rate_limit_info.check(client_ip)?;

        let body = serde_json::json!({
            "client_ip": client_ip.map(|ip| ip.to_string()),
            "rate_limits": {
                "default": self.limiters.default.description(),
                "health_services": self.limiters.health_services.description(),
                "analytics_stats": self.limiters.analytics_stats.description(),
                "analytics_logs": self.limiters.analytics_logs.description(),
                "rate_limit_info": self.limiters.rate_limit_info.description(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        json_response(StatusCode::OK, &body)
    }

    /// Verify the caller holds an admin token. The analytics endpoints are
    /// admin-gated regardless of the configured admin route prefixes.
    fn require_admin(&self, headers: &HeaderMap) -> Result<CallerIdentity, GatewayError> {
        let token = bearer_token(headers).ok_or(GatewayError::AuthenticationRequired)?;
        let identity = self.access.verify_token(&token)?;
        if !identity.is_admin() {
            return Err(GatewayError::InsufficientRole);
        }
        Ok(identity)
    }

    fn method_not_allowed() -> Response<AxumBody> {
        let body = serde_json::json!({
            "error": "method_not_allowed",
            "message": "reserved gateway endpoints only accept GET",
        });
        Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ALLOW, "GET")
            .body(AxumBody::from(body.to_string()))
            .unwrap_or_else(|_| Response::new(AxumBody::empty()))
    }
}

/// Extract the bearer token from an Authorization header, if any.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// First occurrence of a query parameter, percent-decoded.
fn query_param(parts: &Parts, name: &str) -> Option<String> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key.as_ref() == name)
        .map(|(_, value)| value.into_owned())
}

fn json_response(
    status: StatusCode,
    body: &serde_json::Value,
) -> Result<Response<AxumBody>, GatewayError> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(AxumBody::from(body.to_string()))
        .map_err(|e| GatewayError::Internal(format!("failed to build response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "bearer token123".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("token123"));
    }

    #[test]
    fn test_non_bearer_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwdw==".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_missing_authorization_yields_none() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_query_param_parsing() {
        let req = Request::builder()
            .uri("/analytics/stats?days=3&verbose=true")
            .body(AxumBody::empty())
            .unwrap();
        let (parts, _body) = req.into_parts();
        assert_eq!(query_param(&parts, "days").as_deref(), Some("3"));
        assert_eq!(query_param(&parts, "limit"), None);
    }
}
