pub mod analytics;
pub mod forwarder;
pub mod health_checker;
pub mod http_client;
pub mod http_handler;
pub mod memory_store;
pub mod redis_store;

/// Re-export commonly used types from adapters
pub use analytics::{RequestAnalytics, RequestLogEntry};
pub use forwarder::Forwarder;
pub use health_checker::HealthChecker;
pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
