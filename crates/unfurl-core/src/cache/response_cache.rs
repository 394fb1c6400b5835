//! SQLite response cache
//!
//! Survives restarts. Each key is one row, written with `INSERT OR REPLACE`,
//! which makes updates to different keys independent.
//!
//! Cache Version History:
//! - v1: Initial version (`data` JSON text + epoch-millis `timestamp`)

use super::{now_millis, sweep_cutoff, CacheEntry, CacheStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Current cache version; bump when the row format changes
const CACHE_VERSION: i32 = 1;

/// Database file name inside the cache directory
pub const CACHE_FILE: &str = "unfurl-cache.db";

/// SQLite-based response cache (thread-safe)
pub struct ResponseCache {
    conn: Mutex<Connection>,
    cache_path: PathBuf,
}

impl ResponseCache {
    /// Create or open the cache database in `cache_dir`
    pub fn open(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;

        let cache_path = cache_dir.join(CACHE_FILE);
        let conn = Connection::open(&cache_path)
            .with_context(|| format!("Failed to open cache database: {}", cache_path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_timestamp ON responses(timestamp);
            "#,
        )
        .context("Failed to create schema")?;

        let stored_version: Option<i32> = conn
            .query_row(
                "SELECT value FROM cache_metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query cache version")?;

        match stored_version {
            Some(v) if v != CACHE_VERSION => {
                warn!(
                    stored = v,
                    current = CACHE_VERSION,
                    "Cache version mismatch detected, clearing stale cache"
                );
                conn.execute("DELETE FROM responses", [])
                    .context("Failed to clear stale cache")?;
                conn.execute(
                    "INSERT OR REPLACE INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .context("Failed to update cache version")?;
            }
            None => {
                conn.execute(
                    "INSERT INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .context("Failed to initialize cache version")?;
            }
            Some(_) => {}
        }

        debug!(path = %cache_path.display(), "Response cache initialized");

        Ok(Self {
            conn: Mutex::new(conn),
            cache_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Response cache lock poisoned: {}", e))
    }

    /// Number of stored entries
    pub fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))
            .context("Failed to count cache entries")?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl CacheStore for ResponseCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT data, timestamp FROM responses WHERE key = ?",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to query cache")?;

        match row {
            Some((data, timestamp)) => {
                let data = serde_json::from_str(&data)
                    .with_context(|| format!("Corrupt cache entry for {}", key))?;
                Ok(Some(CacheEntry { data, timestamp }))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let data = serde_json::to_string(&entry.data).context("Failed to serialize payload")?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO responses (key, data, timestamp) VALUES (?, ?, ?)",
            params![key, data, entry.timestamp],
        )
        .with_context(|| format!("Failed to write cache entry for {}", key))?;

        Ok(())
    }

    async fn sweep_expired(&self, max_age: Duration) -> Result<usize> {
        let cutoff = sweep_cutoff(max_age, now_millis());

        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM responses WHERE timestamp < ?", params![cutoff])
            .context("Failed to sweep expired entries")?;

        if removed > 0 {
            info!(removed, "Swept expired cache entries");
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM responses", [])
            .context("Failed to clear response cache")?;
        info!(path = %self.cache_path.display(), "Cleared response cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_roundtrip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = ResponseCache::open(dir.path()).unwrap();
            cache
                .put(
                    "example.backlog.jp/issues/PROJ-1",
                    &CacheEntry {
                        data: json!({ "summary": "Fix login" }),
                        timestamp: 42,
                    },
                )
                .await
                .unwrap();
        }

        let reopened = ResponseCache::open(dir.path()).unwrap();
        let entry = reopened
            .get("example.backlog.jp/issues/PROJ-1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(entry.data["summary"], "Fix login");
        assert_eq!(entry.timestamp, 42);
        assert!(reopened.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();

        cache
            .put("k", &CacheEntry { data: json!(1), timestamp: 1 })
            .await
            .unwrap();
        cache
            .put("k", &CacheEntry { data: json!(2), timestamp: 2 })
            .await
            .unwrap();

        let entry = cache.get("k").await.unwrap().unwrap();
        assert_eq!(entry.data, json!(2));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_drops_only_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();

        cache
            .put("old", &CacheEntry { data: json!("old"), timestamp: 0 })
            .await
            .unwrap();
        cache.put("new", &CacheEntry::now(json!("new"))).await.unwrap();

        let removed = cache
            .sweep_expired(Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(cache.get("old").await.unwrap().is_none());
        assert!(cache.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_with_unbounded_max_age_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        cache.put("fresh", &CacheEntry::now(json!(1))).await.unwrap();
        cache
            .put("ancient", &CacheEntry { data: json!(2), timestamp: 0 })
            .await
            .unwrap();

        for max_age in [Duration::from_secs(u64::MAX), Duration::MAX] {
            assert_eq!(cache.sweep_expired(max_age).await.unwrap(), 0);
        }
        assert!(cache.get("fresh").await.unwrap().is_some());
        assert!(cache.get("ancient").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        cache.put("k", &CacheEntry::now(json!(null))).await.unwrap();

        cache.clear().await.unwrap();

        assert!(cache.is_empty().unwrap());
    }
}
