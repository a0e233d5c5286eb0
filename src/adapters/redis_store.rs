//! Redis state store adapter.
//!
//! Backs the circuit breaker registry and request analytics with a store
//! reachable by every gateway instance. Uses a `ConnectionManager`, which
//! multiplexes over one connection, reconnects on failure and is cheap to
//! clone per operation. Counter mutations map to HINCRBY so increments stay
//! atomic under concurrent gateway instances.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::ports::state_store::{StateStore, StateStoreError, StateStoreResult};

/// Redis-backed implementation of [`StateStore`].
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis instance at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> StateStoreResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StateStoreError::Backend(format!("invalid redis url '{url}': {e}")))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StateStoreError::Backend(format!("redis connection failed: {e}")))?;

        tracing::info!("Connected shared state store to redis at {url}");
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn backend_err(e: redis::RedisError) -> StateStoreError {
    StateStoreError::Backend(e.to_string())
}

#[async_trait]
impl StateStore for RedisStore {
    async fn hash_get_all(&self, key: &str) -> StateStoreResult<HashMap<String, String>> {
        let mut conn = self.conn();
        let map: HashMap<String, String> = conn.hgetall(key).await.map_err(backend_err)?;
        Ok(map)
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> StateStoreResult<i64> {
        let mut conn = self.conn();
        let value: i64 = conn.hincr(key, field, delta).await.map_err(backend_err)?;
        Ok(value)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StateStoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.hset(key, field, value).await.map_err(backend_err)?;
        Ok(())
    }

    async fn list_push_front(&self, key: &str, value: &str) -> StateStoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.lpush(key, value).await.map_err(backend_err)?;
        Ok(())
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StateStoreResult<Vec<String>> {
        let mut conn = self.conn();
        let values: Vec<String> = conn
            .lrange(key, start, stop)
            .await
            .map_err(backend_err)?;
        Ok(values)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StateStoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StateStoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.del(key).await.map_err(backend_err)?;
        Ok(())
    }
}
