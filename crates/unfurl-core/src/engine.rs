//! Unfurl engine
//!
//! Wires the tenant registry, caching client, router and node watcher for one
//! document. [`UnfurlEngine::start`] keeps watching until the handle is
//! disconnected; [`UnfurlEngine::unfurl_document`] rewrites a loaded document
//! once and waits for every title.

use crate::cache::{CacheStore, MemoryStore, ResponseCache};
use crate::client::CachingClient;
use crate::config::UnfurlConfig;
use crate::dom::Document;
use crate::error::CoreError;
use crate::router::{Router, TtlPolicy};
use crate::tenant::TenantRegistry;
use crate::transport::Transport;
use crate::watcher::{LinkMatcher, NodeWatcher, WatchHandle};
use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of a one-shot [`UnfurlEngine::unfurl_document`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnfurlReport {
    /// Qualifying links found
    pub links: usize,
    /// Titles applied (a link matched by two descriptors counts twice)
    pub titles: usize,
    /// Expired cache entries removed before unfurling
    pub swept: usize,
}

pub struct UnfurlEngine {
    registry: Arc<dyn TenantRegistry>,
    client: Arc<CachingClient>,
    router: Arc<Router>,
    sweep_max_age: Duration,
}

impl UnfurlEngine {
    pub fn new(router: Arc<Router>, client: Arc<CachingClient>, sweep_max_age: Duration) -> Self {
        Self {
            registry: Arc::clone(client.registry()),
            client,
            router,
            sweep_max_age,
        }
    }

    /// Engine over the configured tenants and the built-in descriptors
    pub fn from_config(
        config: &UnfurlConfig,
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CoreError> {
        let registry = config.registry()?;
        let client = Arc::new(CachingClient::new(Arc::new(registry), store, transport));
        let router = Arc::new(Router::with_defaults(
            Arc::clone(&client),
            TtlPolicy::from(&config.cache),
        ));

        Ok(Self::new(router, client, config.cache.sweep_max_age()))
    }

    /// SQLite store in the configured cache directory, or memory when `persist` is off
    pub fn open_store(config: &UnfurlConfig, persist: bool) -> Result<Arc<dyn CacheStore>> {
        if !persist {
            debug!("Using in-memory response cache");
            return Ok(Arc::new(MemoryStore::default()));
        }

        let dir = config
            .cache
            .cache_dir()
            .context("Could not determine cache directory")?;
        let cache = ResponseCache::open(&dir)
            .with_context(|| format!("Failed to open response cache in {}", dir.display()))?;
        Ok(Arc::new(cache))
    }

    pub fn client(&self) -> &Arc<CachingClient> {
        &self.client
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Watch `doc` and unfurl every qualifying link, now and as it is inserted
    ///
    /// Runs the expired-cache sweep in the background. Titles keep arriving
    /// after this returns; dispatches already running when the handle is
    /// disconnected still complete. Dropping the handle disconnects it, so
    /// keep it alive for as long as the document should be watched.
    pub fn start(&self, doc: &Document) -> WatchHandle {
        let client = Arc::clone(&self.client);
        let max_age = self.sweep_max_age;
        tokio::spawn(async move {
            let removed = client.sweep_expired(max_age).await;
            debug!(removed, "Startup cache sweep finished");
        });

        let router = Arc::clone(&self.router);
        let target = doc.clone();
        NodeWatcher::watch(doc, self.registry.as_ref(), move |node| {
            let router = Arc::clone(&router);
            let doc = target.clone();
            tokio::spawn(async move {
                router.dispatch(&doc, node).await;
            });
        })
    }

    /// Unfurl every qualifying link already in `doc` and wait for all titles
    pub async fn unfurl_document(&self, doc: &Document) -> UnfurlReport {
        let swept = self.client.sweep_expired(self.sweep_max_age).await;

        let matcher = LinkMatcher::new(self.registry.as_ref());
        let links = matcher.collect(doc, doc.root());

        let titles = join_all(links.iter().map(|link| self.router.dispatch(doc, *link)))
            .await
            .into_iter()
            .sum();

        let report = UnfurlReport {
            links: links.len(),
            titles,
            swept,
        };
        info!(
            links = report.links,
            titles = report.titles,
            swept = report.swept,
            "Document unfurled"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{now_millis, CacheEntry};
    use crate::client::testing::MockTransport;
    use crate::tenant::Tenant;
    use serde_json::json;
    use url::Url;

    const PAGE: &str = "https://example.backlog.jp/dashboard";

    fn config() -> UnfurlConfig {
        UnfurlConfig {
            tenants: vec![Tenant::new("example.backlog.jp", "k")],
            ..Default::default()
        }
    }

    fn engine(transport: Arc<MockTransport>, store: Arc<MemoryStore>) -> UnfurlEngine {
        UnfurlEngine::from_config(&config(), store, transport).unwrap()
    }

    #[tokio::test]
    async fn test_unfurl_document_rewrites_links() {
        let transport = Arc::new(MockTransport::default());
        transport.respond(
            "/issues/PROJ-1",
            json!({ "summary": "Fix login", "status": { "name": "Open" } }),
        );
        let engine = engine(transport, Arc::new(MemoryStore::default()));

        let doc = Document::from_html(
            r#"<body>
                <a href="https://example.backlog.jp/view/PROJ-1">https://example.backlog.jp/view/PROJ-1</a>
                <a href="https://example.backlog.jp/git/PROJ/repo/blob/main/a.rs">https://example.backlog.jp/git/PROJ/repo/blob/main/a.rs</a>
                <a href="https://example.com/view/PROJ-1">https://example.com/view/PROJ-1</a>
            </body>"#,
            Some(Url::parse(PAGE).unwrap()),
        );

        let report = engine.unfurl_document(&doc).await;

        assert_eq!(report.links, 2);
        assert_eq!(report.titles, 2);
        let html = doc.to_html();
        assert!(html.contains(">[PROJ-1][Open] Fix login | Issue</a>"));
        assert!(html.contains(">[PROJ/repo] a.rs | Git</a>"));
        assert!(html.contains(">https://example.com/view/PROJ-1</a>"));
    }

    #[tokio::test]
    async fn test_unfurl_document_sweeps_old_entries() {
        let store = Arc::new(MemoryStore::default());
        store
            .put(
                "example.backlog.jp/space",
                &CacheEntry {
                    data: json!({}),
                    timestamp: now_millis() - 8 * 24 * 60 * 60 * 1000,
                },
            )
            .await
            .unwrap();
        let engine = engine(Arc::new(MockTransport::default()), store.clone());

        let report = engine.unfurl_document(&Document::new(None)).await;

        assert_eq!(report.swept, 1);
        assert!(store.get("example.backlog.jp/space").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_unfurls_inserted_links() {
        let engine = engine(
            Arc::new(MockTransport::default()),
            Arc::new(MemoryStore::default()),
        );
        let doc = Document::new(Some(Url::parse(PAGE).unwrap()));
        let handle = engine.start(&doc);

        let href = "https://example.backlog.jp/git/PROJ/repo/commit/0123456789abcdef";
        let a = doc.create_element("a");
        doc.set_attribute(a, "href", href);
        let text = doc.create_text(href);
        doc.append_child(a, text);
        doc.append_child(doc.root(), a);

        for _ in 0..50 {
            if doc.text_content(a) != href {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(doc.text_content(a), "[PROJ/repo] リビジョン : 0123456789 | Git");
        handle.disconnect();
    }

    #[test]
    fn test_duplicate_tenants_rejected() {
        let config = UnfurlConfig {
            tenants: vec![
                Tenant::new("example.backlog.jp", "a"),
                Tenant::new("EXAMPLE.backlog.jp", "b"),
            ],
            ..Default::default()
        };

        let result = UnfurlEngine::from_config(
            &config,
            Arc::new(MemoryStore::default()),
            Arc::new(MockTransport::default()),
        );

        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn test_open_store_in_memory() {
        let store = UnfurlEngine::open_store(&config(), false);
        assert!(store.is_ok());
    }
}
