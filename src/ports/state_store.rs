use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

/// Failures from the shared state backend.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StateStoreError {
    /// The backend rejected or could not complete the operation.
    #[error("state store operation failed: {0}")]
    Backend(String),

    /// A stored value could not be decoded into the expected shape.
    #[error("state store value malformed: {0}")]
    Malformed(String),
}

/// Result type alias for state store operations.
pub type StateStoreResult<T> = Result<T, StateStoreError>;

/// StateStore defines the port for the shared key-value storage that holds
/// circuit breaker records and request analytics.
///
/// Breaker and analytics state is keyed storage shared by all gateway
/// instances, so counter mutations must be atomic on the backend
/// (`hash_incr` is HINCRBY, not read-modify-write) and keys support TTL
/// expiry. The in-memory adapter exists so a single instance (and the test
/// suite) can run without a network store.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Fetch every field of a hash. A missing key yields an empty map.
    async fn hash_get_all(&self, key: &str) -> StateStoreResult<HashMap<String, String>>;

    /// Atomically add `delta` to an integer hash field, creating the key
    /// and field as needed. Returns the post-increment value.
    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> StateStoreResult<i64>;

    /// Set a single hash field.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StateStoreResult<()>;

    /// Push a value onto the front of a list, creating it if missing.
    async fn list_push_front(&self, key: &str, value: &str) -> StateStoreResult<()>;

    /// Read a closed range of list elements, front first. Negative `stop`
    /// counts from the back, matching Redis LRANGE semantics.
    async fn list_range(&self, key: &str, start: isize, stop: isize)
    -> StateStoreResult<Vec<String>>;

    /// Arm (or refresh) a key's time-to-live.
    async fn expire(&self, key: &str, ttl: Duration) -> StateStoreResult<()>;

    /// Remove a key outright. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StateStoreResult<()>;
}
