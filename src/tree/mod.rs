//! Host-page content tree and the reconcile pipeline that runs over it
//!
//! [`reconstruct`] flattens a subtree's text leaves, [`Reconciler`] replaces
//! them with address fragments, and [`MutationWatcher`] drives the reconciler
//! for containers inserted after the initial scan.

mod node;
mod reconcile;
mod reconstruct;
mod watcher;

pub use node::{AddressNode, ContentTree, NodeId, NodeKind};
pub use reconcile::{Fragment, ReconcileOutcome, Reconciler, fragments};
pub use reconstruct::{LeafSpan, LogicalText, reconstruct};
pub use watcher::{ContainerMarker, MutationRecord, MutationWatcher, WatchReport, WatcherState};
