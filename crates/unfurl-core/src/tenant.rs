//! Tenant registry
//!
//! A tenant is one service endpoint (identified by its domain) with its own
//! API credential. The registry is owned by the settings layer; the engine
//! only ever reads it.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One `{domain, credential}` pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(alias = "spaceDomain")]
    pub domain: String,
    #[serde(alias = "apiKey")]
    pub credential: String,
}

impl Tenant {
    pub fn new(domain: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            domain: normalize_domain(&domain.into()),
            credential: credential.into(),
        }
    }
}

// Credentials must never reach logs
impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenant")
            .field("domain", &self.domain)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Lower-case and trim a domain so lookups are case-insensitive
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Read-only source of tenants
pub trait TenantRegistry: Send + Sync {
    /// All registered tenants
    fn list(&self) -> Vec<Tenant>;

    /// Tenant for a domain, compared after normalisation
    fn find(&self, domain: &str) -> Option<Tenant> {
        let domain = normalize_domain(domain);
        self.list().into_iter().find(|t| t.domain == domain)
    }
}

/// Registry over a fixed list, validated at construction
#[derive(Debug, Clone, Default)]
pub struct StaticTenantRegistry {
    tenants: Vec<Tenant>,
}

impl StaticTenantRegistry {
    /// Build a registry, normalising domains and rejecting duplicates
    pub fn new(tenants: Vec<Tenant>) -> Result<Self, CoreError> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(tenants.len());

        for tenant in tenants {
            let domain = normalize_domain(&tenant.domain);
            if domain.is_empty() {
                return Err(CoreError::InvalidConfig {
                    message: "tenant domain must not be empty".to_string(),
                });
            }
            if !seen.insert(domain.clone()) {
                return Err(CoreError::InvalidConfig {
                    message: format!("duplicate tenant domain: {}", domain),
                });
            }
            normalized.push(Tenant {
                domain,
                credential: tenant.credential,
            });
        }

        Ok(Self { tenants: normalized })
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }
}

impl TenantRegistry for StaticTenantRegistry {
    fn list(&self) -> Vec<Tenant> {
        self.tenants.clone()
    }
}
