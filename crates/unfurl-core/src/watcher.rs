//! Node watcher
//!
//! Finds links that qualify for unfurling: an initial scan of the document
//! (deferred until loading finishes) plus a scan of every subtree inserted
//! afterwards.
//!
//! A link qualifies when:
//!   - it is an `a`/`area` element whose `href` resolves to an absolute URL
//!   - the URL's host is a registered tenant domain
//!   - its rendered text is exactly the serialised URL
//!   - it is not inside a `contenteditable` region

use crate::dom::{Document, DocumentEvent, NodeId, ReadyState};
use crate::tenant::TenantRegistry;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace};
use url::Url;

/// Tags treated as links
const ANCHOR_TAGS: &[&str] = &["a", "area"];

/// Decides whether an element should be unfurled
#[derive(Debug, Clone)]
pub struct LinkMatcher {
    domains: HashSet<String>,
}

impl LinkMatcher {
    /// Snapshot the registry's domains
    pub fn new(registry: &dyn TenantRegistry) -> Self {
        Self {
            domains: registry.list().into_iter().map(|t| t.domain).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Resolved URL of a qualifying element, `None` otherwise
    pub fn qualifying_url(&self, doc: &Document, node: NodeId) -> Option<Url> {
        let tag = doc.tag(node)?;
        if !ANCHOR_TAGS.contains(&tag.as_str()) {
            return None;
        }

        // Malformed or relative-without-base hrefs simply do not match
        let url = doc.resolve_href(node)?;
        let host = url.host_str()?.to_ascii_lowercase();
        if !self.domains.contains(&host) {
            return None;
        }

        if doc.text_content(node) != url.as_str() {
            return None;
        }

        if doc
            .closest_with_attribute(node, "contenteditable", is_editable)
            .is_some()
        {
            trace!(url = %url, "Skipping link inside editable region");
            return None;
        }

        Some(url)
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.qualifying_url(doc, node).is_some()
    }

    /// Qualifying links in the subtree rooted at `node`, including `node` itself
    pub fn collect(&self, doc: &Document, node: NodeId) -> Vec<NodeId> {
        let mut candidates = Vec::new();
        if doc.tag(node).is_some_and(|t| ANCHOR_TAGS.contains(&t.as_str())) {
            candidates.push(node);
        }
        candidates.extend(doc.elements_by_tag(node, ANCHOR_TAGS));

        candidates
            .into_iter()
            .filter(|id| self.matches(doc, *id))
            .collect()
    }
}

fn is_editable(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("plaintext-only")
}

/// Handle returned by [`NodeWatcher::watch`]
///
/// Dropping the handle disconnects the watcher.
#[must_use = "dropping the handle stops watching"]
pub struct WatchHandle {
    connected: Arc<AtomicBool>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl WatchHandle {
    fn inert() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
        }
    }

    /// Stop delivering matches; safe to call more than once
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Some(tx) = &self.shutdown_tx {
                let _ = tx.send(true);
            }
            debug!("Node watcher disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Watches one document for qualifying links
pub struct NodeWatcher;

impl NodeWatcher {
    /// Start watching `doc`, calling `on_match` for every qualifying link
    ///
    /// Must be called inside a tokio runtime. When the document has already
    /// loaded, the initial scan runs before this returns. Matches stop as soon
    /// as the returned handle is disconnected or dropped.
    pub fn watch<F>(doc: &Document, registry: &dyn TenantRegistry, on_match: F) -> WatchHandle
    where
        F: Fn(NodeId) + Send + Sync + 'static,
    {
        let matcher = LinkMatcher::new(registry);
        if matcher.is_empty() {
            debug!("No tenants registered, node watcher idle");
            return WatchHandle::inert();
        }

        let connected = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        // Subscribe before scanning so no insertion falls between the two
        let mut events = doc.subscribe();
        let deferred = doc.ready_state() == ReadyState::Loading;

        let deliver = {
            let connected = Arc::clone(&connected);
            move |node: NodeId| {
                if connected.load(Ordering::SeqCst) {
                    on_match(node);
                }
            }
        };

        if !deferred {
            Self::scan(doc, &matcher, &deliver);
        }

        info!(tenants = matcher.domains.len(), deferred, "Node watcher started");

        let doc = doc.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(DocumentEvent::Added(nodes)) => {
                            for node in nodes {
                                for link in matcher.collect(&doc, node) {
                                    deliver(link);
                                }
                            }
                        }
                        Some(DocumentEvent::Loaded) => {
                            if deferred {
                                Self::scan(&doc, &matcher, &deliver);
                            }
                        }
                        None => break,
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("Node watcher task finished");
        });

        WatchHandle {
            connected,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn scan(doc: &Document, matcher: &LinkMatcher, deliver: &impl Fn(NodeId)) {
        let links = matcher.collect(doc, doc.root());
        debug!(matches = links.len(), "Initial scan complete");
        for link in links {
            deliver(link);
        }
    }
}
