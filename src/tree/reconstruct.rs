//! Text reconstruction: flattens the text leaves of a subtree into one logical
//! string and remembers which leaf owns which byte range.

use std::ops::Range;

use super::node::{ContentTree, NodeId, NodeKind};

/// Where a leaf sat and which part of the logical string it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpan {
    /// The text leaf
    pub node: NodeId,
    /// Its parent at scan time
    pub parent: Option<NodeId>,
    /// Its position among the parent's children at scan time
    pub index_in_parent: usize,
    /// Byte range in [`LogicalText::text`]
    pub range: Range<usize>,
}

/// Concatenated text of a subtree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalText {
    /// The logical string
    pub text: String,
    /// Contributing leaves in document order
    pub leaves: Vec<LeafSpan>,
}

impl LogicalText {
    /// True when there is no text at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Leaf owning the byte at `offset`
    #[must_use]
    pub fn leaf_at(&self, offset: usize) -> Option<&LeafSpan> {
        self.leaves.iter().find(|l| l.range.contains(&offset))
    }
}

/// Walk `root` depth-first pre-order and collect its text leaves.
#[must_use]
pub fn reconstruct(tree: &ContentTree, root: NodeId) -> LogicalText {
    let mut logical = LogicalText::default();

    for node in tree.descendants(root) {
        let Some(NodeKind::Text(text)) = tree.kind(node) else {
            continue;
        };
        let start = logical.text.len();
        logical.text.push_str(text);
        logical.leaves.push(LeafSpan {
            node,
            parent: tree.parent(node),
            index_in_parent: tree.index_in_parent(node).unwrap_or(0),
            range: start..logical.text.len(),
        });
    }

    logical
}
