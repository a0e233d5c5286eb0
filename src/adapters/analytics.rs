//! Request analytics over the shared state store.
//!
//! Every proxied request (successful or not) is appended to a recent-history
//! log with 24 hour retention and rolled into per-day counters with 7 day
//! retention. Recording is fire-and-forget: a broken analytics backend is
//! logged and never fails the request that produced the entry. The read
//! side backs the admin analytics endpoints.
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::state_store::{StateStore, StateStoreResult};

const API_LOGS_KEY: &str = "api_logs";
const API_LOGS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DAILY_STATS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One proxied request, as stored in the recent-history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub query: String,
    pub status_code: u16,
    /// Round-trip time in seconds.
    pub response_time: f64,
    /// Upstream the request was attributed to, when routing got that far.
    pub upstream: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: String,
}

/// Write/read interface for the gateway's request analytics.
pub struct RequestAnalytics {
    store: Arc<dyn StateStore>,
}

impl RequestAnalytics {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn daily_key(date: NaiveDate) -> String {
        format!("daily_stats:{}", date.format("%Y-%m-%d"))
    }

    /// Append a log entry and bump the daily counters. Failures are logged
    /// and swallowed; analytics never break the serving path.
    pub async fn record(&self, entry: &RequestLogEntry) {
        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!("Failed to encode request log entry: {err}");
                return;
            }
        };

        if let Err(err) = self.store.list_push_front(API_LOGS_KEY, &json).await {
            tracing::warn!("Failed to append request log entry: {err}");
        } else if let Err(err) = self.store.expire(API_LOGS_KEY, API_LOGS_TTL).await {
            tracing::warn!("Failed to refresh request log TTL: {err}");
        }

        let key = Self::daily_key(Utc::now().date_naive());
        let mut fields = vec![
            "total_requests".to_string(),
            format!("status_{}", entry.status_code),
        ];
        if let Some(upstream) = &entry.upstream {
            fields.push(format!("service_{upstream}"));
        }

        for field in &fields {
            if let Err(err) = self.store.hash_incr(&key, field, 1).await {
                tracing::warn!("Failed to bump daily counter '{field}': {err}");
            }
        }
        if let Err(err) = self.store.expire(&key, DAILY_STATS_TTL).await {
            tracing::warn!("Failed to refresh daily stats TTL: {err}");
        }
    }

    /// Most recent log entries, newest first, at most `limit`. Entries that
    /// fail to parse are skipped rather than failing the whole read.
    pub async fn recent_logs(&self, limit: usize) -> StateStoreResult<Vec<RequestLogEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let raw = self
            .store
            .list_range(API_LOGS_KEY, 0, limit as isize - 1)
            .await?;

        Ok(raw
            .iter()
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("Skipping malformed request log entry: {err}");
                    None
                }
            })
            .collect())
    }

    /// Daily counters for the trailing `days` days, keyed by date. Days
    /// with no recorded traffic are omitted.
    pub async fn daily_stats(
        &self,
        days: u32,
    ) -> StateStoreResult<BTreeMap<String, HashMap<String, i64>>> {
        let today = Utc::now().date_naive();
        let mut stats = BTreeMap::new();

        for offset in 0..days {
            let Some(date) = today.checked_sub_days(chrono::Days::new(offset as u64)) else {
                break;
            };
            let raw = self.store.hash_get_all(&Self::daily_key(date)).await?;
            if raw.is_empty() {
                continue;
            }
            let parsed: HashMap<String, i64> = raw
                .into_iter()
                .filter_map(|(field, value)| value.parse().ok().map(|count| (field, count)))
                .collect();
            stats.insert(date.format("%Y-%m-%d").to_string(), parsed);
        }

        Ok(stats)
    }
}
