//! Arena-backed model of the host page's structured content tree
//!
//! Nodes are never freed; removing a node only detaches it from its parent,
//! so ids held by pending events stay valid and can be checked with
//! [`ContentTree::is_attached`].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::detect::NetworkTag;
use crate::{Error, Result};

/// Stable handle to a node in a [`ContentTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// An interactive address marker produced by reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressNode {
    /// The address text
    pub value: String,
    /// Detected network
    pub network: NetworkTag,
    /// Visual highlight state (pointer is over the marker)
    pub highlighted: bool,
}

/// What a node is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Structural element
    Element {
        /// Tag name
        tag: String,
        /// Attributes
        attributes: BTreeMap<String, String>,
    },
    /// Text-bearing leaf
    Text(String),
    /// Reconciled address marker
    Address(AddressNode),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    processed: bool,
}

/// The page tree
#[derive(Debug, Clone)]
pub struct ContentTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for ContentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentTree {
    /// Create a tree containing only the document root (`body`)
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.push(NodeKind::Element {
            tag: "body".to_string(),
            attributes: BTreeMap::new(),
        });
        tree
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
            processed: false,
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(Error::UnknownNode(id.0))
    }

    /// Document root
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
        })
    }

    /// Create a detached text leaf
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    /// Create a detached address marker
    pub fn create_address(&mut self, value: impl Into<String>, network: NetworkTag) -> NodeId {
        self.push(NodeKind::Address(AddressNode {
            value: value.into(),
            network,
            highlighted: false,
        }))
    }

    /// Create an element and append it to `parent`
    pub fn append_element(&mut self, parent: NodeId, tag: impl Into<String>) -> Result<NodeId> {
        let id = self.create_element(tag);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Create a text leaf and append it to `parent`
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> Result<NodeId> {
        let id = self.create_text(text);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Append `child` as the last child of `parent`, detaching it first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let len = self.node(parent)?.children.len();
        self.insert_child(parent, len, child)
    }

    /// Insert `child` at `index` among `parent`'s children (clamped)
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        self.node(child)?;
        if self.is_descendant_of(parent, child) {
            return Err(Error::Internal(format!(
                "inserting node {} under its own descendant {}",
                child.0, parent.0
            )));
        }
        if matches!(self.node(parent)?.kind, NodeKind::Text(_) | NodeKind::Address(_)) {
            return Err(Error::Internal(format!("node {} cannot have children", parent.0)));
        }

        self.remove(child)?;
        let node = self.node_mut(parent)?;
        let index = index.min(node.children.len());
        node.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Detach `id` (and its subtree) from its parent
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|c| *c != id);
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Node kind
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    /// Mutable access to an address marker
    pub fn address_mut(&mut self, id: NodeId) -> Option<&mut AddressNode> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Address(a)) => Some(a),
            _ => None,
        }
    }

    /// Address marker at `id`, if it is one
    #[must_use]
    pub fn address(&self, id: NodeId) -> Option<&AddressNode> {
        match self.kind(id) {
            Some(NodeKind::Address(a)) => Some(a),
            _ => None,
        }
    }

    /// Text of a text leaf
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Text(t)) => Some(t),
            _ => None,
        }
    }

    /// Parent of a node
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Children of a node
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map_or(&[], |n| &n.children)
    }

    /// Position of `id` among its parent's children
    #[must_use]
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Whether `id` is `ancestor` or lies beneath it
    #[must_use]
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Whether `id` is still reachable from the document root
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_descendant_of(id, self.root)
    }

    /// All nodes under `id` (inclusive), depth-first pre-order
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if node.0 >= self.nodes.len() {
                continue;
            }
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Attribute value of an element
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Element { attributes, .. }) => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// Set an attribute on an element
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => {
                attributes.insert(name.into(), value.into());
                Ok(())
            }
            _ => Err(Error::Internal(format!("node {} is not an element", id.0))),
        }
    }

    /// Whether the subtree carries the processed marker
    #[must_use]
    pub fn is_processed(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(|n| n.processed)
    }

    /// Set the processed marker
    pub fn mark_processed(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.processed = true;
        Ok(())
    }

    /// Visible text of the subtree: text leaves and address values in order
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| match self.kind(n) {
                Some(NodeKind::Text(t)) => Some(t.as_str()),
                Some(NodeKind::Address(a)) => Some(a.value.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Address markers under `id`, in document order
    #[must_use]
    pub fn address_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| matches!(self.kind(*n), Some(NodeKind::Address(_))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_walk_preorder() {
        let mut tree = ContentTree::new();
        let root = tree.root();
        let div = tree.append_element(root, "div").unwrap();
        let a = tree.append_text(div, "a").unwrap();
        let span = tree.append_element(div, "span").unwrap();
        let b = tree.append_text(span, "b").unwrap();
        let c = tree.append_text(div, "c").unwrap();

        assert_eq!(tree.descendants(div), vec![div, a, span, b, c]);
        assert_eq!(tree.text_content(root), "abc");
        assert_eq!(tree.index_in_parent(span), Some(1));
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let mut tree = ContentTree::new();
        let div = tree.append_element(tree.root(), "div").unwrap();
        let text = tree.append_text(div, "hello").unwrap();

        tree.remove(div).unwrap();
        assert!(!tree.is_attached(div));
        assert!(!tree.is_attached(text));
        assert!(tree.is_descendant_of(text, div));
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn test_insert_child_moves_node() {
        let mut tree = ContentTree::new();
        let root = tree.root();
        let first = tree.append_element(root, "p").unwrap();
        let second = tree.append_element(root, "p").unwrap();
        let text = tree.append_text(first, "x").unwrap();

        tree.insert_child(second, 0, text).unwrap();
        assert!(tree.children(first).is_empty());
        assert_eq!(tree.children(second), &[text]);
        assert_eq!(tree.parent(text), Some(second));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut tree = ContentTree::new();
        let outer = tree.append_element(tree.root(), "div").unwrap();
        let inner = tree.append_element(outer, "div").unwrap();
        assert!(tree.append_child(inner, outer).is_err());
    }

    #[test]
    fn test_text_cannot_have_children() {
        let mut tree = ContentTree::new();
        let text = tree.append_text(tree.root(), "leaf").unwrap();
        let other = tree.create_text("x");
        assert!(tree.append_child(text, other).is_err());
    }

    #[test]
    fn test_attributes_and_marker() {
        let mut tree = ContentTree::new();
        let div = tree.append_element(tree.root(), "div").unwrap();
        tree.set_attribute(div, "data-testid", "tweetText").unwrap();
        assert_eq!(tree.attribute(div, "data-testid"), Some("tweetText"));

        assert!(!tree.is_processed(div));
        tree.mark_processed(div).unwrap();
        assert!(tree.is_processed(div));
    }

    #[test]
    fn test_unknown_node() {
        let mut tree = ContentTree::new();
        let mut other = ContentTree::new();
        for _ in 0..5 {
            other.create_text("x");
        }
        let foreign = other.create_text("y");
        assert!(matches!(tree.remove(foreign), Err(Error::UnknownNode(_))));
        assert!(tree.kind(foreign).is_none());
    }
}
