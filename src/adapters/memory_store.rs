//! In-process state store adapter.
//!
//! Implements the same hash/list/TTL surface as the Redis adapter against a
//! mutex-guarded map, so a single-instance gateway (and the test suite) can
//! run with no network store. Expired keys are dropped lazily on access.
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use crate::ports::state_store::{StateStore, StateStoreError, StateStoreResult};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Mutex-guarded map implementing [`StateStore`].
///
/// The guard is never held across an await point, so the synchronous mutex
/// is safe inside async trait methods.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StateStoreResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StateStoreError::Backend("memory store mutex poisoned".to_string()))
    }

    fn purge_if_expired(entries: &mut HashMap<String, Entry>, key: &str) {
        if entries.get(key).is_some_and(Entry::is_expired) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn hash_get_all(&self, key: &str) -> StateStoreResult<HashMap<String, String>> {
        let mut entries = self.lock()?;
        Self::purge_if_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(_) => Err(StateStoreError::Malformed(format!(
                "key '{key}' holds a non-hash value"
            ))),
        }
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> StateStoreResult<i64> {
        let mut entries = self.lock()?;
        Self::purge_if_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        let Value::Hash(hash) = &mut entry.value else {
            return Err(StateStoreError::Malformed(format!(
                "key '{key}' holds a non-hash value"
            )));
        };
        let current: i64 = match hash.get(field) {
            None => 0,
            Some(raw) => raw.parse().map_err(|_| {
                StateStoreError::Malformed(format!(
                    "field '{field}' of '{key}' is not an integer"
                ))
            })?,
        };
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StateStoreResult<()> {
        let mut entries = self.lock()?;
        Self::purge_if_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        let Value::Hash(hash) = &mut entry.value else {
            return Err(StateStoreError::Malformed(format!(
                "key '{key}' holds a non-hash value"
            )));
        };
        hash.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn list_push_front(&self, key: &str, value: &str) -> StateStoreResult<()> {
        let mut entries = self.lock()?;
        Self::purge_if_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        let Value::List(list) = &mut entry.value else {
            return Err(StateStoreError::Malformed(format!(
                "key '{key}' holds a non-list value"
            )));
        };
        list.push_front(value.to_string());
        Ok(())
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StateStoreResult<Vec<String>> {
        let mut entries = self.lock()?;
        Self::purge_if_expired(&mut entries, key);
        let list = match entries.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => list,
            Some(_) => {
                return Err(StateStoreError::Malformed(format!(
                    "key '{key}' holds a non-list value"
                )));
            }
        };

        let len = list.len() as isize;
        let normalize = |index: isize| -> isize {
            if index < 0 { len + index } else { index }
        };
        let from = normalize(start).max(0);
        let to = normalize(stop).min(len - 1);
        if from > to || len == 0 {
            return Ok(Vec::new());
        }

        Ok(list
            .iter()
            .skip(from as usize)
            .take((to - from + 1) as usize)
            .cloned()
            .collect())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StateStoreResult<()> {
        let mut entries = self.lock()?;
        Self::purge_if_expired(&mut entries, key);
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StateStoreResult<()> {
        let mut entries = self.lock()?;
        entries.remove(key);
        Ok(())
    }
}
