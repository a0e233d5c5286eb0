pub mod auth;
pub mod breaker;
pub mod error;
pub mod rate_limiter;
pub mod router;
pub mod upstream;

pub use auth::{AccessController, CallerIdentity};
pub use breaker::{BreakerPolicy, CircuitBreakerRegistry};
pub use error::GatewayError;
pub use rate_limiter::SurfaceLimiter;
pub use router::RouteTable;
pub use upstream::{HealthRegistry, UpstreamHealth};
