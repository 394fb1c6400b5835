//! In-memory response cache
//!
//! Used when persistence is disabled and in tests. Bounded by entry count;
//! freshness is still decided by the caller's TTL against each entry's own
//! timestamp, so moka's eviction is only a size limit.

use super::{now_millis, sweep_cutoff, CacheEntry, CacheStore};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

/// Default maximum number of payloads held in memory
const DEFAULT_CAPACITY: u64 = 10_000;

pub struct MemoryStore {
    entries: Cache<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).await)
    }

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.entries.insert(key.to_string(), entry.clone()).await;
        Ok(())
    }

    async fn sweep_expired(&self, max_age: Duration) -> Result<usize> {
        let cutoff = sweep_cutoff(max_age, now_millis());
        let stale: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.timestamp < cutoff)
            .map(|(key, _)| key)
            .collect();

        for key in &stale {
            self.entries.invalidate(key.as_str()).await;
        }
        Ok(stale.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = MemoryStore::default();
        store
            .put("old", &CacheEntry { data: json!(1), timestamp: 0 })
            .await
            .unwrap();
        store.put("new", &CacheEntry::now(json!(2))).await.unwrap();

        let removed = store.sweep_expired(Duration::from_secs(60)).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert_eq!(store.get("new").await.unwrap().unwrap().data, json!(2));
    }

    #[tokio::test]
    async fn test_sweep_matches_persistent_store_rules() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = crate::cache::ResponseCache::open(dir.path()).unwrap();
        let memory = MemoryStore::default();

        let now = now_millis();
        // One entry past the max age, one written in the future
        let entries = [("old", now - 120_000), ("new", now + 60_000)];
        let stores: [&dyn CacheStore; 2] = [&memory, &sqlite];

        for store in stores {
            for (key, timestamp) in entries {
                store
                    .put(key, &CacheEntry { data: json!(key), timestamp })
                    .await
                    .unwrap();
            }
            assert_eq!(store.sweep_expired(Duration::from_secs(60)).await.unwrap(), 1);
            assert_eq!(store.sweep_expired(Duration::MAX).await.unwrap(), 0);
            assert!(store.get("old").await.unwrap().is_none());
            assert!(store.get("new").await.unwrap().is_some());
        }
    }
}
