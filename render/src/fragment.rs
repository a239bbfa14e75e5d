//! Parsed, mutable view of a sanitized HTML fragment.
//!
//! The stages after the sanitizer parse its output with html5ever into an `RcDom`, rewrite the
//! nodes they care about and serialize the tree back. Serializing a tree nobody touched
//! reproduces the sanitizer's output exactly.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use html5ever::LocalName;
use html5ever::Namespace;
use html5ever::ParseOpts;
use html5ever::QualName;
use html5ever::parse_fragment;
use html5ever::serialize::SerializeOpts;
use html5ever::serialize::TraversalScope;
use html5ever::serialize::serialize;
use html5ever::tendril::StrTendril;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::Handle;
use markup5ever_rcdom::Node;
use markup5ever_rcdom::NodeData;
use markup5ever_rcdom::RcDom;
use markup5ever_rcdom::SerializableHandle;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

pub(crate) struct Fragment {
    // Dropping an rcdom node empties the whole subtree, so the document must outlive `root`.
    _document: Handle,
    root: Handle,
}

impl Fragment {
    pub(crate) fn parse(html: &str) -> Self {
        let context = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from("div"),
        );
        let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new())
            .one(html);
        let document = dom.document.clone();
        // Fragment parsing hangs the nodes off a synthetic `<html>` element.
        let root = first_child(&document).unwrap_or_else(|| document.clone());
        Self {
            _document: document,
            root,
        }
    }

    pub(crate) fn root(&self) -> &Handle {
        &self.root
    }

    pub(crate) fn to_html(&self) -> String {
        let mut out = Vec::new();
        let opts = SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..SerializeOpts::default()
        };
        if let Err(err) = serialize(&mut out, &SerializableHandle::from(self.root.clone()), opts) {
            tracing::warn!("failed to serialize HTML fragment: {err}");
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// Parse `html` and detach its top-level nodes, ready to be spliced into another tree.
pub(crate) fn parse_nodes(html: &str) -> Vec<Handle> {
    let fragment = Fragment::parse(html);
    std::mem::take(&mut *fragment.root.children.borrow_mut())
}

pub(crate) fn children(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

pub(crate) fn first_child(node: &Handle) -> Option<Handle> {
    node.children.borrow().first().cloned()
}

/// Replace `parent`'s children in `range` with `nodes`.
pub(crate) fn replace_children(parent: &Handle, range: Range<usize>, nodes: Vec<Handle>) {
    for node in &nodes {
        node.parent.set(Some(Rc::downgrade(parent)));
    }
    let _removed: Vec<Handle> = parent.children.borrow_mut().splice(range, nodes).collect();
}

pub(crate) fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub(crate) fn is_html_element(node: &Handle, tag: &str) -> bool {
    match &node.data {
        NodeData::Element { name, .. } => &*name.ns == HTML_NAMESPACE && &*name.local == tag,
        _ => false,
    }
}

pub(crate) fn attribute(node: &Handle, attr: &str) -> Option<String> {
    let NodeData::Element { attrs, .. } = &node.data else {
        return None;
    };
    attrs
        .borrow()
        .iter()
        .find(|a| &*a.name.local == attr)
        .map(|a| String::from(&*a.value))
}

/// Contents of a text node; `None` for every other kind of node.
pub(crate) fn text(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(String::from(&**contents.borrow())),
        _ => None,
    }
}

pub(crate) fn text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// Concatenated text of `node` and its descendants.
#[cfg(test)]
pub(crate) fn text_content(node: &Handle) -> String {
    let mut out = text(node).unwrap_or_default();
    for child in children(node) {
        out.push_str(&text_content(&child));
    }
    out
}
