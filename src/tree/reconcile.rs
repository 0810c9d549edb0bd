//! Tree reconciler: replaces the text leaves of a subtree with an ordered
//! sequence of plain-text and address fragments.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use super::node::{ContentTree, NodeId};
use super::reconstruct::{LogicalText, reconstruct};
use crate::bus::{BusEvent, DetectedAddress, EventBus};
use crate::detect::{AddressMatch, NetworkTag, PatternRegistry, resolve};
use crate::{Error, Result};

/// One piece of a reconciled subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Fragment {
    /// Plain text between addresses
    Text(String),
    /// An interactive address
    Address {
        /// The address text
        value: String,
        /// Detected network
        network: NetworkTag,
    },
}

impl Fragment {
    /// The literal text this fragment renders
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Address { value, .. } => value,
        }
    }
}

/// Split `text` into fragments around `matches` (sorted, non-overlapping).
///
/// Concatenating [`Fragment::as_str`] over the result reproduces `text`.
#[must_use]
pub fn fragments(text: &str, matches: &[AddressMatch]) -> Vec<Fragment> {
    let mut out = Vec::with_capacity(matches.len() * 2 + 1);
    let mut cursor = 0;

    for m in matches {
        if m.start < cursor {
            continue;
        }
        let (Some(gap), Some(value)) = (text.get(cursor..m.start), text.get(m.start..m.end)) else {
            continue;
        };
        if !gap.is_empty() {
            out.push(Fragment::Text(gap.to_string()));
        }
        out.push(Fragment::Address {
            value: value.to_string(),
            network: m.network,
        });
        cursor = m.end;
    }

    if let Some(rest) = text.get(cursor..)
        && !rest.is_empty()
    {
        out.push(Fragment::Text(rest.to_string()));
    }
    out
}

/// What a reconcile call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The subtree already carried the processed marker
    AlreadyProcessed,
    /// The subtree (or one of its leaves) left the document first
    Detached,
    /// Nothing matched; structure untouched
    NoMatches,
    /// Leaves replaced by fragments
    Rebuilt {
        /// Distinct addresses inserted, in document order
        addresses: Vec<DetectedAddress>,
    },
}

impl ReconcileOutcome {
    /// Addresses inserted by this call
    #[must_use]
    pub fn addresses(&self) -> &[DetectedAddress] {
        match self {
            Self::Rebuilt { addresses } => addresses,
            _ => &[],
        }
    }
}

/// Runs reconstruct, resolve and rebuild over one subtree
#[derive(Debug, Clone)]
pub struct Reconciler {
    registry: Arc<PatternRegistry>,
    bus: Option<EventBus>,
}

impl Reconciler {
    /// Create a reconciler without a bus
    #[must_use]
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self {
            registry,
            bus: None,
        }
    }

    /// Publish detected addresses on `bus`
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Pattern registry in use
    #[must_use]
    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Reconcile the subtree at `root`.
    pub fn reconcile(&self, tree: &mut ContentTree, root: NodeId) -> Result<ReconcileOutcome> {
        if tree.kind(root).is_none() {
            return Err(Error::UnknownNode(root.index()));
        }
        if tree.is_processed(root) {
            trace!(node = root.index(), "Subtree already processed");
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }
        if !tree.is_attached(root) {
            debug!(node = root.index(), "Subtree detached before reconcile");
            return Ok(ReconcileOutcome::Detached);
        }

        let logical = reconstruct(tree, root);
        let matches = resolve(&self.registry, &logical.text);
        self.apply(tree, root, &logical, &matches)
    }

    /// Rebuild `root` from an earlier reconstruction and its matches.
    ///
    /// Returns [`ReconcileOutcome::Detached`] without touching the tree if any
    /// recorded leaf has moved since `logical` was taken.
    pub fn apply(
        &self,
        tree: &mut ContentTree,
        root: NodeId,
        logical: &LogicalText,
        matches: &[AddressMatch],
    ) -> Result<ReconcileOutcome> {
        if tree.is_processed(root) {
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }
        let stale = !tree.is_attached(root)
            || logical.leaves.iter().any(|leaf| {
                tree.parent(leaf.node) != leaf.parent || !tree.is_descendant_of(leaf.node, root)
            });
        if stale {
            debug!(node = root.index(), "Leaves moved between scan and reconcile");
            return Ok(ReconcileOutcome::Detached);
        }

        tree.mark_processed(root)?;
        if matches.is_empty() {
            return Ok(ReconcileOutcome::NoMatches);
        }

        let (target, mut index) = match logical.leaves.first() {
            Some(first) => match first.parent {
                Some(parent) if parent != first.node && tree.is_descendant_of(parent, root) => {
                    (parent, first.index_in_parent)
                }
                _ => (root, tree.children(root).len()),
            },
            None => (root, tree.children(root).len()),
        };

        for leaf in &logical.leaves {
            tree.remove(leaf.node)?;
        }

        let mut seen = HashSet::new();
        let mut addresses = Vec::new();
        for fragment in fragments(&logical.text, matches) {
            let node = match fragment {
                Fragment::Text(text) => tree.create_text(text),
                Fragment::Address { value, network } => {
                    if seen.insert((value.clone(), network)) {
                        addresses.push(DetectedAddress {
                            address: value.clone(),
                            network,
                        });
                    }
                    tree.create_address(value, network)
                }
            };
            tree.insert_child(target, index, node)?;
            index += 1;
        }

        debug!(
            node = root.index(),
            leaves = logical.leaves.len(),
            addresses = addresses.len(),
            "Rebuilt subtree"
        );
        if let Some(bus) = &self.bus {
            bus.publish(BusEvent::AddressesDetected(addresses.clone()));
        }
        Ok(ReconcileOutcome::Rebuilt { addresses })
    }
}
