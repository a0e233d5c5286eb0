//! Portico - an API gateway core for microservice fleets.
//!
//! Portico fronts a set of HTTP microservices with a **hexagonal
//! architecture**: business rules (routing, access control, circuit
//! breaking) live in `core`, I/O seams are `ports` traits, and concrete
//! integrations (hyper client, Redis state, the inbound handler) are
//! `adapters`. This library exposes the building blocks so the gateway can
//! be embedded or composed inside another application.
//!
//! # Features
//! - Deterministic longest-prefix path routing to named upstreams
//! - Bearer-token access control (HS256 JWT) with protected and admin
//!   route sets, identity asserted downstream via `x-user-id`/`x-user-role`
//! - Per-upstream circuit breaking backed by a shared state store, with
//!   lazy window expiry and no half-open probe state
//! - Single-attempt request forwarding with per-upstream deadlines; 504 /
//!   503 / 502 mapping for timeout / unreachable / transport errors
//! - Request analytics: 24 h recent-history log and 7-day daily counters
//! - Per-surface, per-client-IP rate limiting
//! - Background upstream health probing with hysteresis thresholds
//! - Structured tracing (JSON) and a `metrics`-facade instrumentation layer
//! - Graceful shutdown with owned background task cancellation
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use portico::{
//!     HttpClientAdapter, HttpHandler, MemoryStore,
//!     config::GatewayConfig, core::upstream::HealthRegistry,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config: GatewayConfig = portico::config::load_config("portico.toml").await?;
//! let config = Arc::new(config);
//! let handler = HttpHandler::new(
//!     config.clone(),
//!     Arc::new(HttpClientAdapter::new()?),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(HealthRegistry::new(config.upstreams.keys())),
//! )?;
//! // Wire `handler` into an Axum catch-all route (see the binary crate).
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! The pipeline returns `Result<_, GatewayError>` end to end; the outermost
//! handler performs the single translation to HTTP statuses and structured
//! JSON bodies. Binary-level wiring uses `eyre::Result` with context.
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{
        Forwarder, HealthChecker, HttpClientAdapter, HttpHandler, MemoryStore, RedisStore,
        RequestAnalytics,
    },
    core::{AccessController, CircuitBreakerRegistry, GatewayError, RouteTable},
    ports::{http_client::HttpClient, state_store::StateStore},
    utils::GracefulShutdown,
};
