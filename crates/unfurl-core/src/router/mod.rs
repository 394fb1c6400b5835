//! Resource router
//!
//! Each [`ResourceDescriptor`] pairs a path pattern with a title builder. The
//! router runs every descriptor against a link concurrently and applies each
//! title as soon as it resolves, so when two descriptors match the same link
//! the last one to finish wins.

pub mod descriptors;

use crate::api::Space;
use crate::client::CachingClient;
use crate::config::CacheConfig;
use crate::dom::{Document, NodeId};
use crate::error::CoreError;
use crate::replacer;
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

pub use descriptors::default_descriptors;

/// Resource types a link can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Issue,
    Wiki,
    WikiTitle,
    Document,
    PullRequest,
    GitFile,
    GitCommit,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Issue => "issue",
            ResourceKind::Wiki => "wiki",
            ResourceKind::WikiTitle => "wiki-title",
            ResourceKind::Document => "document",
            ResourceKind::PullRequest => "pull-request",
            ResourceKind::GitFile => "git-file",
            ResourceKind::GitCommit => "git-commit",
        };
        f.write_str(name)
    }
}

/// Named captures from a descriptor's pattern
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    values: HashMap<String, String>,
}

impl RouteParams {
    /// Match `path` against `pattern`, collecting every named group that participated
    pub fn capture(pattern: &Regex, path: &str) -> Option<Self> {
        let caps = pattern.captures(path)?;
        let values = pattern
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Some(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// TTLs handed to title builders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// Issues, comments, pull requests
    pub volatile: Duration,
    /// Space, projects, wikis, documents
    pub stable: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for TtlPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            volatile: config.volatile_ttl(),
            stable: config.stable_ttl(),
        }
    }
}

/// What a title builder may use
pub struct TitleContext<'a> {
    pub client: &'a CachingClient,
    pub ttl: TtlPolicy,
}

/// One resource type: a pattern plus a title builder
#[async_trait]
pub trait ResourceDescriptor: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Pattern matched against the URL path
    fn pattern(&self) -> &Regex;

    fn parse(&self, url: &Url) -> Option<RouteParams> {
        RouteParams::capture(self.pattern(), url.path())
    }

    /// `Ok(None)` means the link deliberately gets no title
    async fn build_title(
        &self,
        params: &RouteParams,
        url: &Url,
        ctx: &TitleContext<'_>,
    ) -> Result<Option<String>, CoreError>;
}

/// Dispatches links to the registered descriptors
pub struct Router {
    descriptors: Vec<Arc<dyn ResourceDescriptor>>,
    client: Arc<CachingClient>,
    ttl: TtlPolicy,
}

impl Router {
    pub fn new(
        client: Arc<CachingClient>,
        ttl: TtlPolicy,
        descriptors: Vec<Arc<dyn ResourceDescriptor>>,
    ) -> Self {
        Self {
            descriptors,
            client,
            ttl,
        }
    }

    /// Router over every built-in resource type
    pub fn with_defaults(client: Arc<CachingClient>, ttl: TtlPolicy) -> Self {
        Self::new(client, ttl, default_descriptors())
    }

    pub fn descriptors(&self) -> &[Arc<dyn ResourceDescriptor>] {
        &self.descriptors
    }

    /// Descriptors whose pattern matches `url`
    pub fn matching(&self, url: &Url) -> Vec<(ResourceKind, RouteParams)> {
        self.descriptors
            .iter()
            .filter_map(|d| d.parse(url).map(|params| (d.kind(), params)))
            .collect()
    }

    /// Run every descriptor against `element` and apply the titles they produce
    ///
    /// Returns how many titles were applied.
    pub async fn dispatch(&self, doc: &Document, element: NodeId) -> usize {
        let Some(url) = doc.resolve_href(element) else {
            return 0;
        };
        let page_host = doc.host();

        let attempts = self.descriptors.iter().map(|descriptor| {
            let url = &url;
            let page_host = page_host.as_deref();
            async move {
                let title = self.resolve(descriptor.as_ref(), url, page_host).await?;
                replacer::apply(doc, element, &title);
                debug!(kind = %descriptor.kind(), url = %url, "Applied title");
                Some(())
            }
        });

        join_all(attempts).await.into_iter().flatten().count()
    }

    /// Title for a bare URL: the first descriptor, in registration order, that yields one
    pub async fn title_for(&self, url: &Url, page_host: Option<&str>) -> Option<String> {
        let attempts = self
            .descriptors
            .iter()
            .map(|descriptor| self.resolve(descriptor.as_ref(), url, page_host));

        join_all(attempts).await.into_iter().flatten().next()
    }

    async fn resolve(
        &self,
        descriptor: &dyn ResourceDescriptor,
        url: &Url,
        page_host: Option<&str>,
    ) -> Option<String> {
        let params = descriptor.parse(url)?;
        trace!(kind = %descriptor.kind(), url = %url, "Pattern matched");

        let ctx = TitleContext {
            client: &self.client,
            ttl: self.ttl,
        };

        let built = match descriptor.build_title(&params, url, &ctx).await {
            Ok(title) => title,
            Err(e) => {
                log_failure(descriptor.kind(), url, &e);
                return None;
            }
        };
        let title = built.filter(|t| !t.is_empty())?;

        match self.with_space_prefix(title, url, page_host).await {
            Ok(title) => Some(title),
            Err(e) => {
                log_failure(descriptor.kind(), url, &e);
                None
            }
        }
    }

    /// Prefix `[space name]` when the link points at another host than the page
    async fn with_space_prefix(
        &self,
        title: String,
        url: &Url,
        page_host: Option<&str>,
    ) -> Result<String, CoreError> {
        let Some(link_host) = url.host_str() else {
            return Ok(title);
        };
        if page_host.is_some_and(|h| h.eq_ignore_ascii_case(link_host)) {
            return Ok(title);
        }

        let space: Space = self.client.get(link_host, "/space", self.ttl.stable).await?;
        Ok(format!("[{}]{}", space.name, title))
    }
}

fn log_failure(kind: ResourceKind, url: &Url, error: &CoreError) {
    if error.is_config() {
        debug!(kind = %kind, url = %url, error = %error, "No title: link domain not configured");
    } else {
        warn!(kind = %kind, url = %url, error = %error, "Failed to build title");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::client::testing::MockTransport;
    use crate::tenant::{StaticTenantRegistry, Tenant};
    use serde_json::json;

    const PAGE: &str = "https://example.backlog.jp/dashboard";

    fn router(transport: Arc<MockTransport>) -> Router {
        let registry =
            StaticTenantRegistry::new(vec![Tenant::new("example.backlog.jp", "k")]).unwrap();
        let client = CachingClient::new(
            Arc::new(registry),
            Arc::new(MemoryStore::default()),
            transport,
        );
        Router::with_defaults(Arc::new(client), TtlPolicy::default())
    }

    fn linked_doc(page: Option<&str>, href: &str) -> (Document, NodeId) {
        let doc = Document::new(page.map(|p| Url::parse(p).unwrap()));
        let a = doc.create_element("a");
        doc.set_attribute(a, "href", href);
        let img = doc.create_element("img");
        let text = doc.create_text(href);
        doc.append_children(a, &[img, text]);
        doc.append_child(doc.root(), a);
        (doc, a)
    }

    #[test]
    fn test_route_params_capture() {
        let pattern = Regex::new(r"^/view/(?P<issue_key>[A-Z0-9_]+-[0-9]+)$").unwrap();

        let params = RouteParams::capture(&pattern, "/view/PROJ-1").unwrap();
        assert_eq!(params.get("issue_key"), Some("PROJ-1"));
        assert!(RouteParams::capture(&pattern, "/view/proj-1").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_applies_title_same_host() {
        let transport = Arc::new(MockTransport::default());
        let router = router(transport.clone());
        let (doc, a) = linked_doc(
            Some(PAGE),
            "https://example.backlog.jp/git/PROJ/my-repo/blob/main/src/App.tsx",
        );

        assert_eq!(router.dispatch(&doc, a).await, 1);

        assert_eq!(doc.text_content(a), "[PROJ/my-repo] App.tsx | Git");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_prefixes_space_for_foreign_page() {
        let transport = Arc::new(MockTransport::default());
        transport.respond("/space", json!({ "name": "TestSpace", "spaceKey": "test" }));
        let router = router(transport.clone());
        let (doc, a) = linked_doc(
            Some("https://intranet.example.com/"),
            "https://example.backlog.jp/git/NAKAMURA/hackz-nulab-26/commit/d883cf51748ad8d4d864d1143657a10a27f73e17",
        );

        router.dispatch(&doc, a).await;

        assert_eq!(
            doc.text_content(a),
            "[TestSpace][NAKAMURA/hackz-nulab-26] リビジョン : d883cf5174 | Git"
        );
    }

    #[tokio::test]
    async fn test_failing_descriptor_leaves_link_untouched() {
        let transport = Arc::new(MockTransport::default());
        transport.fail("/issues/PROJ-1", 500);
        let router = router(transport);
        let href = "https://example.backlog.jp/view/PROJ-1";
        let (doc, a) = linked_doc(Some(PAGE), href);

        assert_eq!(router.dispatch(&doc, a).await, 0);
        assert_eq!(doc.text_content(a), href);
    }

    #[tokio::test]
    async fn test_failure_in_one_descriptor_does_not_block_others() {
        struct Failing;
        static ANY: once_cell::sync::Lazy<Regex> =
            once_cell::sync::Lazy::new(|| Regex::new("^/git/").unwrap());

        #[async_trait]
        impl ResourceDescriptor for Failing {
            fn kind(&self) -> ResourceKind {
                ResourceKind::GitFile
            }
            fn pattern(&self) -> &Regex {
                &ANY
            }
            async fn build_title(
                &self,
                _: &RouteParams,
                _: &Url,
                _: &TitleContext<'_>,
            ) -> Result<Option<String>, CoreError> {
                Err(CoreError::InvalidConfig {
                    message: "boom".to_string(),
                })
            }
        }

        let transport = Arc::new(MockTransport::default());
        let base = router(transport);
        let mut descriptors: Vec<Arc<dyn ResourceDescriptor>> = vec![Arc::new(Failing)];
        descriptors.extend(default_descriptors());
        let router = Router::new(Arc::clone(&base.client), TtlPolicy::default(), descriptors);

        let (doc, a) = linked_doc(
            Some(PAGE),
            "https://example.backlog.jp/git/PROJ/my-repo/tree/main/src/components",
        );

        assert_eq!(router.dispatch(&doc, a).await, 1);
        assert_eq!(doc.text_content(a), "[PROJ/my-repo] components | Git");
    }

    #[tokio::test]
    async fn test_unconfigured_link_domain_yields_no_title() {
        let transport = Arc::new(MockTransport::default());
        let router = router(transport.clone());
        let url = Url::parse("https://unknown.backlog.jp/view/PROJ-1").unwrap();

        assert!(router
            .title_for(&url, Some("unknown.backlog.jp"))
            .await
            .is_none());
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_matching_reports_kinds() {
        let router = router(Arc::new(MockTransport::default()));
        let url = Url::parse(
            "https://example.backlog.jp/document/PROJ/0123456789abcdef0123456789abcdef",
        )
        .unwrap();

        let matches = router.matching(&url);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0, ResourceKind::Document);
        assert_eq!(matches[0].1.get("project_key"), Some("PROJ"));
        assert_eq!(
            matches[0].1.get("document_id"),
            Some("0123456789abcdef0123456789abcdef")
        );
    }
}
