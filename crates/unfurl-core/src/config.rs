//! Configuration for unfurl
//!
//! Read from `<config_dir>/unfurl/config.toml`:
//!
//! ```toml
//! [[tenants]]
//! domain = "example.backlog.jp"
//! credential = "..."
//!
//! [cache]
//! volatile_ttl_secs = 300
//! stable_ttl_secs = 86400
//! sweep_max_age_secs = 604800
//! ```
//!
//! When the file lists no tenants, `UNFURL_TENANTS` (a JSON array of
//! `{domain, credential}`) is used instead.

use crate::error::CoreError;
use crate::tenant::{StaticTenantRegistry, Tenant};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable holding fallback tenants as JSON
pub const TENANTS_ENV: &str = "UNFURL_TENANTS";

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnfurlConfig {
    pub tenants: Vec<Tenant>,
    pub cache: CacheConfig,
}

/// TTLs and storage location for the response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for resources that change often (issues, comments, pull requests)
    pub volatile_ttl_secs: u64,

    /// TTL for resources that rarely change (space, projects, wikis, documents)
    pub stable_ttl_secs: u64,

    /// Entries older than this are dropped by the startup sweep
    pub sweep_max_age_secs: u64,

    /// Directory holding the cache database (default: `<cache_dir>/unfurl`)
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            volatile_ttl_secs: 5 * 60,
            stable_ttl_secs: 24 * 60 * 60,
            sweep_max_age_secs: 7 * 24 * 60 * 60,
            dir: None,
        }
    }
}

impl CacheConfig {
    pub fn volatile_ttl(&self) -> Duration {
        Duration::from_secs(self.volatile_ttl_secs)
    }

    pub fn stable_ttl(&self) -> Duration {
        Duration::from_secs(self.stable_ttl_secs)
    }

    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_secs(self.sweep_max_age_secs)
    }

    /// Resolved cache directory
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("unfurl")))
    }
}

impl UnfurlConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("unfurl").join("config.toml"))
    }

    /// Parse a config file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CoreError::ConfigRead {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        Self::from_toml(&content).map_err(|message| CoreError::ConfigParse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Fill tenants from `UNFURL_TENANTS` when none are configured
    pub fn with_env_fallback(mut self) -> Self {
        if self.tenants.is_empty() {
            if let Ok(raw) = std::env::var(TENANTS_ENV) {
                self.tenants = parse_tenants_json(&raw);
            }
        }
        self
    }

    /// Validated registry over the configured tenants
    pub fn registry(&self) -> Result<StaticTenantRegistry, CoreError> {
        StaticTenantRegistry::new(self.tenants.clone())
    }
}

/// Parse a JSON tenant list; malformed input yields no tenants
pub fn parse_tenants_json(raw: &str) -> Vec<Tenant> {
    match serde_json::from_str::<Vec<Tenant>>(raw) {
        Ok(tenants) => tenants,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed {}", TENANTS_ENV);
            Vec::new()
        }
    }
}
