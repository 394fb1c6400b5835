//! Rewrites the visible URL text of a link
//!
//! Only text nodes change. Elements (icons, images, wrappers) keep their
//! identity and position.

use crate::dom::{Document, NodeId};
use tracing::trace;

/// Replace the text of `root`'s own URL with `title`
///
/// Returns the number of text nodes rewritten. A second call with the same
/// title finds no URL text and is a no-op.
pub fn apply(doc: &Document, root: NodeId, title: &str) -> usize {
    let Some(url) = doc.resolve_href(root) else {
        return 0;
    };
    replace_text(doc, root, url.as_str(), title)
}

/// Replace every occurrence of `needle` in the text nodes under `root`
pub fn replace_text(doc: &Document, root: NodeId, needle: &str, replacement: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }

    let mut rewritten = 0;
    for node in doc.descendants(root) {
        let Some(text) = doc.text(node) else { continue };

        if text == needle {
            doc.set_text(node, replacement);
        } else if text.contains(needle) {
            doc.set_text(node, &text.replace(needle, replacement));
        } else {
            continue;
        }
        rewritten += 1;
    }

    trace!(rewritten, "Replaced link text");
    rewritten
}
