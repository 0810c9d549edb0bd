//! Mutation watcher
//!
//! Receives batches of structural-change records from the host page and runs
//! the reconciler over newly inserted content containers only. The whole
//! document is walked once, by [`MutationWatcher::scan_existing`], at startup.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::node::{ContentTree, NodeId, NodeKind};
use super::reconcile::{ReconcileOutcome, Reconciler};
use crate::bus::DetectedAddress;
use crate::config::ContainerConfig;

/// Attribute selector identifying content containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMarker {
    /// Attribute name
    pub attribute: String,
    /// Required attribute value
    pub value: String,
}

impl ContainerMarker {
    /// Create a marker
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Whether `node` is a content container
    #[must_use]
    pub fn matches(&self, tree: &ContentTree, node: NodeId) -> bool {
        tree.attribute(node, &self.attribute) == Some(self.value.as_str())
    }
}

impl From<&ContainerConfig> for ContainerMarker {
    fn from(config: &ContainerConfig) -> Self {
        Self::new(config.attribute.clone(), config.value.clone())
    }
}

/// One structural-change notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    /// Nodes inserted into the document
    pub added: Vec<NodeId>,
}

impl MutationRecord {
    /// Record a single inserted node
    #[must_use]
    pub fn added(node: NodeId) -> Self {
        Self { added: vec![node] }
    }
}

/// Watcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    /// Nothing queued
    Idle,
    /// A batch is waiting for [`MutationWatcher::flush`]
    ScanScheduled,
}

/// Result of processing one or more batches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatchReport {
    /// Containers visited
    pub containers: usize,
    /// Containers rebuilt with address fragments
    pub rebuilt: usize,
    /// Containers skipped (already processed or detached)
    pub skipped: usize,
    /// Addresses inserted, in processing order
    pub detected: Vec<DetectedAddress>,
}

impl WatchReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        self.containers += 1;
        match outcome {
            ReconcileOutcome::AlreadyProcessed | ReconcileOutcome::Detached => self.skipped += 1,
            ReconcileOutcome::NoMatches => {}
            ReconcileOutcome::Rebuilt { addresses } => {
                self.rebuilt += 1;
                self.detected.extend(addresses);
            }
        }
    }

    fn merge(&mut self, other: Self) {
        self.containers += other.containers;
        self.rebuilt += other.rebuilt;
        self.skipped += other.skipped;
        self.detected.extend(other.detected);
    }
}

/// Watches the content tree for inserted containers
#[derive(Debug)]
pub struct MutationWatcher {
    reconciler: Reconciler,
    marker: ContainerMarker,
    queue: VecDeque<Vec<MutationRecord>>,
}

impl MutationWatcher {
    /// Create a watcher
    #[must_use]
    pub fn new(reconciler: Reconciler, marker: ContainerMarker) -> Self {
        Self {
            reconciler,
            marker,
            queue: VecDeque::new(),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> WatcherState {
        if self.queue.is_empty() {
            WatcherState::Idle
        } else {
            WatcherState::ScanScheduled
        }
    }

    /// Container marker in use
    #[must_use]
    pub fn marker(&self) -> &ContainerMarker {
        &self.marker
    }

    /// Reconcile every container already in the document
    pub fn scan_existing(&self, tree: &mut ContentTree) -> WatchReport {
        let root = tree.root();
        let report = self.process_subtree(tree, root);
        debug!(
            containers = report.containers,
            rebuilt = report.rebuilt,
            "Initial scan complete"
        );
        report
    }

    /// Queue a batch for the next [`flush`](Self::flush)
    pub fn schedule(&mut self, batch: Vec<MutationRecord>) {
        self.queue.push_back(batch);
    }

    /// Process every queued batch and return to [`WatcherState::Idle`]
    pub fn flush(&mut self, tree: &mut ContentTree) -> WatchReport {
        let mut report = WatchReport::default();
        while let Some(batch) = self.queue.pop_front() {
            for record in batch {
                for node in record.added {
                    if !matches!(tree.kind(node), Some(NodeKind::Element { .. })) {
                        continue;
                    }
                    report.merge(self.process_subtree(tree, node));
                }
            }
        }
        report
    }

    /// Schedule and immediately process one batch
    pub fn on_mutations(&mut self, tree: &mut ContentTree, batch: Vec<MutationRecord>) -> WatchReport {
        self.schedule(batch);
        self.flush(tree)
    }

    fn process_subtree(&self, tree: &mut ContentTree, node: NodeId) -> WatchReport {
        let mut report = WatchReport::default();
        let containers: Vec<NodeId> = if self.marker.matches(tree, node) {
            vec![node]
        } else {
            tree.descendants(node)
                .into_iter()
                .filter(|n| self.marker.matches(tree, *n))
                .collect()
        };

        for container in containers {
            match self.reconciler.reconcile(tree, container) {
                Ok(outcome) => report.record(outcome),
                Err(e) => warn!(node = container.index(), error = %e, "Reconcile failed"),
            }
        }
        report
    }
}
