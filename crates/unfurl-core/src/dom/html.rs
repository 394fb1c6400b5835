//! HTML input and output for [`Document`]
//!
//! Parsing goes through `scraper` (html5ever); serialisation is a plain
//! writer that escapes text and attribute values.

use super::{Document, NodeId, NodeKind};
use scraper::{Html, Node};
use std::collections::HashMap;
use url::Url;

/// Elements without a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text is written verbatim
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

impl Document {
    /// Parse a full HTML document into a loaded [`Document`]
    pub fn from_html(html: &str, base_url: Option<Url>) -> Self {
        let parsed = Html::parse_document(html);
        let doc = Document::new(base_url);

        // Pre-order walk: every parent is mapped before its children
        let mut ids = HashMap::new();
        ids.insert(parsed.tree.root().id(), doc.root());

        for node in parsed.tree.root().descendants().skip(1) {
            let Some(parent) = node.parent().and_then(|p| ids.get(&p.id()).copied()) else {
                continue;
            };
            let kind = match node.value() {
                Node::Element(el) => NodeKind::Element {
                    tag: el.name().to_ascii_lowercase(),
                    attrs: el
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
                Node::Text(text) => NodeKind::Text(text.text.to_string()),
                Node::Comment(comment) => NodeKind::Comment(comment.comment.to_string()),
                Node::Doctype(doctype) => NodeKind::Doctype(doctype.name().to_string()),
                _ => continue,
            };

            let id = doc.create_node(kind);
            doc.inner.tree.write().append(parent, id);
            ids.insert(node.id(), id);
        }
        doc
    }

    /// Serialise the whole document back to HTML
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.write_node(child, false, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, raw_text: bool, out: &mut String) {
        let Some(kind) = self.kind(id) else { return };

        match kind {
            NodeKind::Document => {
                for child in self.children(id) {
                    self.write_node(child, false, out);
                }
            }
            NodeKind::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(&name);
                out.push('>');
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(&text);
                out.push_str("-->");
            }
            NodeKind::Text(text) => {
                if raw_text {
                    out.push_str(&text);
                } else {
                    out.push_str(&escape(&text, false));
                }
            }
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(&tag);
                for (name, value) in &attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }

                let raw = RAW_TEXT_ELEMENTS.contains(&tag.as_str());
                for child in self.children(id) {
                    self.write_node(child, raw, out);
                }
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
        }
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}
