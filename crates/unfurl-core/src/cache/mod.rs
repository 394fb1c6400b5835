//! Persistent response cache
//!
//! Stores raw API payloads keyed by `domain + resourcePath`. Every write is a
//! per-key upsert, so concurrent writers to different keys never clobber each
//! other.

pub mod memory;
pub mod response_cache;

pub use memory::MemoryStore;
pub use response_cache::ResponseCache;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One cached payload and the time it was written (epoch millis)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    pub timestamp: i64,
}

impl CacheEntry {
    /// Entry stamped with the current time
    pub fn now(data: serde_json::Value) -> Self {
        Self {
            data,
            timestamp: now_millis(),
        }
    }

    /// Age measured from the entry's own write time
    pub fn age(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.timestamp).max(0) as u64)
    }

    pub fn is_fresh(&self, ttl: Duration, now_ms: i64) -> bool {
        self.age(now_ms) < ttl
    }
}

/// Current wall-clock time in epoch millis
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Write time before which an entry is older than `max_age`
///
/// Every store sweeps entries with `timestamp < cutoff`, i.e. `age > max_age`.
/// Ages too large for epoch millis saturate, so nothing is ever swept.
pub fn sweep_cutoff(max_age: Duration, now_ms: i64) -> i64 {
    let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(max_age_ms)
}

/// Key/value store behind the caching client
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or fully replace the entry for `key`
    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()>;

    /// Drop entries older than `max_age`, returning how many were removed
    async fn sweep_expired(&self, max_age: Duration) -> Result<usize>;

    /// Drop every entry
    async fn clear(&self) -> Result<()>;
}
