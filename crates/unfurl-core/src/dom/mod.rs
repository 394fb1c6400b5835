//! Document model the engine runs against
//!
//! An arena of element/text nodes behind a `parking_lot::RwLock`, plus one
//! unbounded event queue per subscriber. Inserting a node into the connected
//! tree publishes one `DocumentEvent::Added` batch; finishing the load
//! publishes `DocumentEvent::Loaded`. Subscribers never lose events, however
//! far behind they fall.

pub mod html;

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// Handle to a node; only meaningful for the document that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype(String),
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Complete,
}

/// Structural change notifications
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    /// Roots of subtrees inserted into the document
    Added(Vec<NodeId>),
    /// Loading finished
    Loaded,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<NodeData>,
    ready: ReadyState,
}

impl Tree {
    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0)
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.node(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.node(child).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = None;
        }
    }

    fn append(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.node(parent).is_none() || self.node(child).is_none() {
            return false;
        }
        if self.is_ancestor_or_self(child, parent) {
            return false;
        }
        self.detach(child);
        if let Some(p) = self.node_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
        true
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Comment(_) | NodeKind::Doctype(_) => {}
            NodeKind::Document | NodeKind::Element { .. } => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.node(id) else { return };
        for child in &node.children {
            out.push(*child);
            self.collect_descendants(*child, out);
        }
    }
}

struct Inner {
    base_url: Option<Url>,
    tree: RwLock<Tree>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DocumentEvent>>>,
}

/// Shared handle to one document
#[derive(Clone)]
pub struct Document {
    inner: Arc<Inner>,
}

impl Document {
    /// Empty, fully loaded document
    pub fn new(base_url: Option<Url>) -> Self {
        Self::with_state(base_url, ReadyState::Complete)
    }

    /// Empty document still loading; call [`Document::finish_loading`] when done
    pub fn loading(base_url: Option<Url>) -> Self {
        Self::with_state(base_url, ReadyState::Loading)
    }

    fn with_state(base_url: Option<Url>, ready: ReadyState) -> Self {
        let mut tree = Tree {
            nodes: Vec::new(),
            ready,
        };
        tree.push(NodeKind::Document);

        Self {
            inner: Arc::new(Inner {
                base_url,
                tree: RwLock::new(tree),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// URL the document was loaded from; relative hrefs resolve against it
    pub fn base_url(&self) -> Option<&Url> {
        self.inner.base_url.as_ref()
    }

    /// Host of the page itself, if any
    pub fn host(&self) -> Option<String> {
        self.base_url()
            .and_then(|u| u.host_str())
            .map(|h| h.to_ascii_lowercase())
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.tree.read().ready
    }

    /// Mark loading finished and notify subscribers (no-op when already complete)
    pub fn finish_loading(&self) {
        {
            let mut tree = self.inner.tree.write();
            if tree.ready == ReadyState::Complete {
                return;
            }
            tree.ready = ReadyState::Complete;
        }
        self.publish(DocumentEvent::Loaded);
    }

    /// Subscribe to structural changes from now on
    ///
    /// The queue is unbounded; dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DocumentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, event: DocumentEvent) {
        // Closed receivers are pruned on the way
        self.inner
            .subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Same underlying document
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ===================
    // Construction
    // ===================

    /// Detached element
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.inner.tree.write().push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    /// Detached text node
    pub fn create_text(&self, text: &str) -> NodeId {
        self.inner
            .tree
            .write()
            .push(NodeKind::Text(text.to_string()))
    }

    pub(crate) fn create_node(&self, kind: NodeKind) -> NodeId {
        self.inner.tree.write().push(kind)
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut tree = self.inner.tree.write();
        if let Some(NodeKind::Element { attrs, .. }) = tree.node_mut(node).map(|n| &mut n.kind) {
            let name = name.to_ascii_lowercase();
            match attrs.iter_mut().find(|(k, _)| *k == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name, value.to_string())),
            }
        }
    }

    /// Replace the content of a text node
    pub fn set_text(&self, node: NodeId, text: &str) {
        let mut tree = self.inner.tree.write();
        if let Some(NodeKind::Text(existing)) = tree.node_mut(node).map(|n| &mut n.kind) {
            *existing = text.to_string();
        }
    }

    // ===================
    // Mutation
    // ===================

    /// Move `child` under `parent`; returns false for unknown nodes or cycles
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
        self.append_children(parent, &[child]) > 0
    }

    /// Append several children and publish them as one batch
    pub fn append_children(&self, parent: NodeId, children: &[NodeId]) -> usize {
        let (added, connected) = {
            let mut tree = self.inner.tree.write();
            let added: Vec<NodeId> = children
                .iter()
                .copied()
                .filter(|child| tree.append(parent, *child))
                .collect();
            let connected = tree.is_ancestor_or_self(NodeId(0), parent);
            (added, connected)
        };

        let count = added.len();
        if connected && !added.is_empty() {
            self.publish(DocumentEvent::Added(added));
        }
        count
    }

    /// Detach a node (and its subtree) from its parent
    pub fn remove(&self, node: NodeId) {
        self.inner.tree.write().detach(node);
    }

    // ===================
    // Queries
    // ===================

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner.tree.read().node(node).map(|n| n.kind.clone())
    }

    /// Lower-case tag name for elements
    pub fn tag(&self, node: NodeId) -> Option<String> {
        match self.inner.tree.read().node(node).map(|n| &n.kind) {
            Some(NodeKind::Element { tag, .. }) => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.tag(node).is_some()
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match self.inner.tree.read().node(node).map(|n| &n.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    /// Content of a text node
    pub fn text(&self, node: NodeId) -> Option<String> {
        match self.inner.tree.read().node(node).map(|n| &n.kind) {
            Some(NodeKind::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    /// Concatenated text of every descendant text node
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.inner.tree.read().collect_text(node, &mut out);
        out
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.tree.read().node(node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .tree
            .read()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Descendants in depth-first pre-order, excluding `node`
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.inner.tree.read().collect_descendants(node, &mut out);
        out
    }

    /// Descendant elements with one of `tags`, excluding `node`
    pub fn elements_by_tag(&self, node: NodeId, tags: &[&str]) -> Vec<NodeId> {
        let tree = self.inner.tree.read();
        let mut all = Vec::new();
        tree.collect_descendants(node, &mut all);
        all.into_iter()
            .filter(|id| {
                matches!(
                    tree.node(*id).map(|n| &n.kind),
                    Some(NodeKind::Element { tag, .. }) if tags.contains(&tag.as_str())
                )
            })
            .collect()
    }

    /// Whether the node is attached under the document root
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.inner.tree.read().is_ancestor_or_self(NodeId(0), node)
    }

    /// Nearest ancestor-or-self element whose `attr` satisfies `pred`
    pub fn closest_with_attribute(
        &self,
        node: NodeId,
        attr: &str,
        pred: impl Fn(&str) -> bool,
    ) -> Option<NodeId> {
        let tree = self.inner.tree.read();
        let mut current = Some(node);
        while let Some(id) = current {
            let data = tree.node(id)?;
            if let NodeKind::Element { attrs, .. } = &data.kind {
                if attrs
                    .iter()
                    .any(|(k, v)| k.eq_ignore_ascii_case(attr) && pred(v))
                {
                    return Some(id);
                }
            }
            current = data.parent;
        }
        None
    }

    /// Absolute URL of the node's `href`, resolved against the base URL
    pub fn resolve_href(&self, node: NodeId) -> Option<Url> {
        let href = self.attribute(node, "href")?;
        let href = href.trim();
        match self.base_url() {
            Some(base) => base.join(href).ok(),
            None => Url::parse(href).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content_and_descendants() {
        let doc = Document::new(None);
        let a = doc.create_element("A");
        let img = doc.create_element("img");
        let span = doc.create_element("span");
        let t1 = doc.create_text("hello ");
        let t2 = doc.create_text("world");
        doc.append_children(a, &[img, t1, span]);
        doc.append_child(span, t2);
        doc.append_child(doc.root(), a);

        assert_eq!(doc.tag(a).as_deref(), Some("a"));
        assert_eq!(doc.text_content(a), "hello world");
        assert_eq!(doc.descendants(a), vec![img, t1, span, t2]);
        assert_eq!(doc.elements_by_tag(doc.root(), &["span"]), vec![span]);
    }

    #[test]
    fn test_append_rejects_cycles() {
        let doc = Document::new(None);
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner);

        assert!(!doc.append_child(inner, outer));
        assert_eq!(doc.parent(outer), None);
    }

    #[test]
    fn test_append_moves_existing_child() {
        let doc = Document::new(None);
        let first = doc.create_element("div");
        let second = doc.create_element("div");
        let child = doc.create_text("x");
        doc.append_child(first, child);
        doc.append_child(second, child);

        assert!(doc.children(first).is_empty());
        assert_eq!(doc.children(second), vec![child]);
    }

    #[tokio::test]
    async fn test_events_only_for_connected_insertions() {
        let doc = Document::new(None);
        let mut rx = doc.subscribe();

        let detached = doc.create_element("div");
        let link = doc.create_element("a");
        doc.append_child(detached, link); // not connected, no event
        doc.append_child(doc.root(), detached);

        match rx.recv().await.unwrap() {
            DocumentEvent::Added(nodes) => assert_eq!(nodes, vec![detached]),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_finish_loading_publishes_once() {
        let doc = Document::loading(None);
        let mut rx = doc.subscribe();

        doc.finish_loading();
        doc.finish_loading();

        assert!(matches!(rx.recv().await.unwrap(), DocumentEvent::Loaded));
        assert!(rx.try_recv().is_err());
        assert_eq!(doc.ready_state(), ReadyState::Complete);
    }

    #[test]
    fn test_subscriber_keeps_every_batch() {
        let doc = Document::new(None);
        let mut rx = doc.subscribe();

        for _ in 0..5000 {
            let p = doc.create_element("p");
            doc.append_child(doc.root(), p);
        }

        let mut received = 0;
        while let Ok(DocumentEvent::Added(_)) = rx.try_recv() {
            received += 1;
        }
        assert_eq!(received, 5000);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let doc = Document::new(None);
        drop(doc.subscribe());

        let p = doc.create_element("p");
        doc.append_child(doc.root(), p);

        assert!(doc.inner.subscribers.lock().is_empty());
    }

    #[test]
    fn test_resolve_href() {
        let base = Url::parse("https://example.backlog.jp/view/PROJ-1").unwrap();
        let doc = Document::new(Some(base));
        let a = doc.create_element("a");
        doc.set_attribute(a, "href", "/alias/wiki/12");

        assert_eq!(
            doc.resolve_href(a).unwrap().as_str(),
            "https://example.backlog.jp/alias/wiki/12"
        );

        let orphan = Document::new(None);
        let b = orphan.create_element("a");
        orphan.set_attribute(b, "href", "/relative");
        assert!(orphan.resolve_href(b).is_none());
    }

    #[test]
    fn test_closest_with_attribute() {
        let doc = Document::new(None);
        let editor = doc.create_element("div");
        doc.set_attribute(editor, "contenteditable", "true");
        let p = doc.create_element("p");
        let a = doc.create_element("a");
        doc.append_child(editor, p);
        doc.append_child(p, a);

        assert_eq!(
            doc.closest_with_attribute(a, "contenteditable", |v| v == "true"),
            Some(editor)
        );
        assert_eq!(
            doc.closest_with_attribute(a, "contenteditable", |v| v == "false"),
            None
        );
    }
}
