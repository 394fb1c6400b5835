//! Caching API client
//!
//! `get` answers from the persistent cache when the entry is younger than the
//! caller's TTL. Otherwise it joins the request already in flight for the same
//! key, or starts one. At most one request per key is outstanding at a time.

use crate::api::Schema;
use crate::cache::{now_millis, CacheEntry, CacheStore};
use crate::error::CoreError;
use crate::tenant::{normalize_domain, TenantRegistry};
use crate::transport::{ApiRequest, Transport};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

type Pending = Shared<BoxFuture<'static, Result<serde_json::Value, CoreError>>>;

/// Deduplicating, caching client over one tenant registry
pub struct CachingClient {
    registry: Arc<dyn TenantRegistry>,
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    in_flight: Arc<DashMap<String, Pending>>,
}

/// Removes the in-flight marker when the request finishes or is dropped
struct InFlightGuard {
    in_flight: Arc<DashMap<String, Pending>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

impl CachingClient {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            store,
            transport,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<dyn TenantRegistry> {
        &self.registry
    }

    /// Cache key for a resource; never includes the credential
    pub fn cache_key(domain: &str, resource_path: &str) -> String {
        format!("{}{}", normalize_domain(domain), resource_path)
    }

    /// Number of requests currently outstanding
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Fetch `resource_path` from `domain` and decode it as `T`
    pub async fn get<T>(&self, domain: &str, resource_path: &str, ttl: Duration) -> Result<T, CoreError>
    where
        T: DeserializeOwned + Schema,
    {
        let key = Self::cache_key(domain, resource_path);
        let data = self.get_raw(domain, resource_path, ttl).await?;

        serde_json::from_value(data).map_err(|e| CoreError::Schema {
            key,
            schema: T::NAME,
            message: e.to_string(),
        })
    }

    /// Fetch the raw JSON payload
    pub async fn get_raw(
        &self,
        domain: &str,
        resource_path: &str,
        ttl: Duration,
    ) -> Result<serde_json::Value, CoreError> {
        let tenant = self
            .registry
            .find(domain)
            .ok_or_else(|| CoreError::TenantNotFound {
                domain: domain.to_string(),
            })?;

        let key = Self::cache_key(&tenant.domain, resource_path);

        match self.store.get(&key).await {
            Ok(Some(entry)) if entry.is_fresh(ttl, now_millis()) => {
                trace!(key = %key, "Cache hit");
                return Ok(entry.data);
            }
            Ok(Some(_)) => debug!(key = %key, "Cache entry stale"),
            Ok(None) => trace!(key = %key, "Cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Cache read failed, treating as miss"),
        }

        let pending = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(existing) => {
                debug!(key = %key, "Joining in-flight request");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let request = ApiRequest::new(&tenant.domain, resource_path, &tenant.credential)?;
                let pending = self.start_request(key.clone(), request);
                slot.insert(pending.clone());
                pending
            }
        };

        pending.await
    }

    fn start_request(&self, key: String, request: ApiRequest) -> Pending {
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        let in_flight = Arc::clone(&self.in_flight);

        async move {
            let _guard = InFlightGuard {
                in_flight,
                key: key.clone(),
            };

            debug!(domain = %request.domain, path = %request.resource_path, "Requesting");
            let data = transport.get_json(&request).await?;

            if let Err(e) = store.put(&key, &CacheEntry::now(data.clone())).await {
                warn!(key = %key, error = %e, "Cache write failed");
            }
            Ok(data)
        }
        .boxed()
        .shared()
    }

    /// Drop cached entries older than `max_age`
    pub async fn sweep_expired(&self, max_age: Duration) -> usize {
        match self.store.sweep_expired(max_age).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Cache sweep failed");
                0
            }
        }
    }

    /// Drop every cached entry
    pub async fn clear(&self) -> anyhow::Result<()> {
        self.store.clear().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport answering from a fixed map of resource paths
    #[derive(Default)]
    pub struct MockTransport {
        pub responses: Mutex<HashMap<String, Result<serde_json::Value, CoreError>>>,
        pub calls: AtomicUsize,
        pub requested: Mutex<Vec<String>>,
        pub delay: Option<Duration>,
    }

    impl MockTransport {
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        pub fn respond(&self, resource_path: &str, body: serde_json::Value) {
            self.responses
                .lock()
                .insert(resource_path.to_string(), Ok(body));
        }

        pub fn fail(&self, resource_path: &str, status: u16) {
            self.responses.lock().insert(
                resource_path.to_string(),
                Err(CoreError::Status {
                    domain: "mock".to_string(),
                    resource_path: resource_path.to_string(),
                    status,
                }),
            );
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn get_json(&self, request: &ApiRequest) -> Result<serde_json::Value, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().push(request.resource_path.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .get(&request.resource_path)
                .cloned()
                .unwrap_or_else(|| {
                    Err(CoreError::Status {
                        domain: request.domain.clone(),
                        resource_path: request.resource_path.clone(),
                        status: 404,
                    })
                })
        }
    }
}
