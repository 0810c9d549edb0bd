//! Overlay event loop
//!
//! Ties the page to everything else: structural changes go to the mutation
//! watcher, pointer and keyboard input to the popover controller, and
//! completed analyses from the bus back into the open popover. All of it runs
//! on one task; only the upstream fan-out and the hover-leave grace timer are
//! spawned, and both report back through channels.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::Result;
use crate::analysis::Aggregator;
use crate::bus::{BusEvent, Subscription};
use crate::config::Config;
use crate::detect::PatternRegistry;
use crate::popover::{CloseTicket, PopoverController, PopoverEvent, PopoverId, Rect, Viewport};
use crate::tree::{
    ContainerMarker, ContentTree, MutationRecord, MutationWatcher, NodeId, Reconciler, WatchReport,
};

/// Input from the host page
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// Nodes were inserted
    Mutations(Vec<MutationRecord>),
    /// Pointer entered an address marker; `anchor` is its bounding box
    HoverEnter {
        /// Address marker node
        node: NodeId,
        /// Marker bounds in viewport coordinates
        anchor: Rect,
    },
    /// Pointer left an address marker
    HoverLeave {
        /// Address marker node
        node: NodeId,
    },
    /// Pointer entered the popover
    PopoverPointerEnter(PopoverId),
    /// Pointer left the popover
    PopoverPointerLeave(PopoverId),
    /// Page scrolled to the given offset
    Scroll {
        /// Horizontal offset
        x: f64,
        /// Vertical offset
        y: f64,
    },
    /// Mouse click
    Click {
        /// Click landed on the popover
        inside_popover: bool,
    },
    /// Key press, by key name (`Escape`, `Enter`, ...)
    Key(String),
    /// Window resized
    Resize {
        /// New width
        width: f64,
        /// New height
        height: f64,
    },
}

/// Running totals for one overlay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayStats {
    /// Containers reconciled with at least one address
    pub rebuilt: usize,
    /// Analyses requested by hovering
    pub analyses_requested: usize,
    /// Analyses shown in the popover
    pub analyses_shown: usize,
}

/// One page's overlay
#[derive(Debug)]
pub struct Overlay {
    tree: ContentTree,
    watcher: MutationWatcher,
    popover: PopoverController,
    aggregator: Arc<Aggregator>,
    bus: Subscription,
    viewport: Viewport,
    tickets_tx: mpsc::UnboundedSender<CloseTicket>,
    tickets_rx: mpsc::UnboundedReceiver<CloseTicket>,
    stats: OverlayStats,
}

impl Overlay {
    /// Assemble an overlay. Subscribes to the aggregator's bus immediately.
    #[must_use]
    pub fn new(
        tree: ContentTree,
        watcher: MutationWatcher,
        popover: PopoverController,
        aggregator: Arc<Aggregator>,
        viewport: Viewport,
    ) -> Self {
        let bus = aggregator.bus().subscribe();
        let (tickets_tx, tickets_rx) = mpsc::unbounded_channel();
        Self {
            tree,
            watcher,
            popover,
            aggregator,
            bus,
            viewport,
            tickets_tx,
            tickets_rx,
            stats: OverlayStats::default(),
        }
    }

    /// Build the detection and popover pieces from configuration
    pub fn from_config(
        config: &Config,
        tree: ContentTree,
        aggregator: Arc<Aggregator>,
        viewport: Viewport,
    ) -> Result<Self> {
        let registry = Arc::new(PatternRegistry::from_config(&config.detection)?);
        let reconciler = Reconciler::new(registry).with_bus(aggregator.bus().clone());
        let watcher = MutationWatcher::new(
            reconciler,
            ContainerMarker::from(&config.detection.container),
        );
        Ok(Self::new(
            tree,
            watcher,
            PopoverController::new(&config.popover),
            aggregator,
            viewport,
        ))
    }

    /// The page tree
    #[must_use]
    pub fn tree(&self) -> &ContentTree {
        &self.tree
    }

    /// Mutable page tree, for the host to insert content before notifying
    pub fn tree_mut(&mut self) -> &mut ContentTree {
        &mut self.tree
    }

    /// Popover controller
    #[must_use]
    pub fn popover(&self) -> &PopoverController {
        &self.popover
    }

    /// Popover side effects since the last call
    pub fn drain_popover_events(&mut self) -> Vec<PopoverEvent> {
        self.popover.drain_events()
    }

    /// Current viewport
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Running totals
    #[must_use]
    pub fn stats(&self) -> &OverlayStats {
        &self.stats
    }

    /// Reconcile the containers already on the page
    pub fn start(&mut self) -> WatchReport {
        let report = self.watcher.scan_existing(&mut self.tree);
        self.stats.rebuilt += report.rebuilt;
        info!(
            containers = report.containers,
            rebuilt = report.rebuilt,
            addresses = report.detected.len(),
            "Overlay started"
        );
        report
    }

    /// Process events until `events` closes
    pub async fn run(mut self, mut events: mpsc::Receiver<PageEvent>) -> Self {
        while self.step(&mut events).await {}
        debug!(stats = ?self.stats, "Overlay stopped");
        self
    }

    /// Wait for and handle exactly one event. Returns `false` once the page
    /// channel is closed.
    pub async fn step(&mut self, events: &mut mpsc::Receiver<PageEvent>) -> bool {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    self.handle(event);
                    true
                }
                None => false,
            },
            Some(event) = self.bus.recv() => {
                self.on_bus(event);
                true
            }
            Some(ticket) = self.tickets_rx.recv() => {
                self.popover.grace_elapsed(ticket);
                true
            }
        }
    }

    /// Handle one page event. Must be called from within a Tokio runtime.
    pub fn handle(&mut self, event: PageEvent) {
        trace!(event = ?event, "Page event");
        match event {
            PageEvent::Mutations(batch) => {
                let report = self.watcher.on_mutations(&mut self.tree, batch);
                self.stats.rebuilt += report.rebuilt;
            }
            PageEvent::HoverEnter { node, anchor } => self.hover_enter(node, anchor),
            PageEvent::HoverLeave { node } => self.hover_leave(node),
            PageEvent::PopoverPointerEnter(id) => self.popover.pointer_enter_popover(id),
            PageEvent::PopoverPointerLeave(id) => {
                self.popover.pointer_leave_popover(id);
            }
            PageEvent::Scroll { x, y } => {
                self.viewport = self.viewport.scrolled(x, y);
                self.popover.scroll();
            }
            PageEvent::Click { inside_popover } => {
                self.popover.click(inside_popover);
            }
            PageEvent::Key(key) => {
                self.popover.key(&key);
            }
            PageEvent::Resize { width, height } => {
                self.viewport.width = width;
                self.viewport.height = height;
            }
        }
    }

    fn on_bus(&mut self, event: BusEvent) {
        match event {
            BusEvent::AnalysisReady(ready) => {
                if self.popover.analysis_ready(&ready.address, &ready.record) {
                    self.stats.analyses_shown += 1;
                }
            }
            BusEvent::AddressesDetected(addresses) => {
                trace!(count = addresses.len(), "Addresses detected");
            }
        }
    }

    fn hover_enter(&mut self, node: NodeId, anchor: Rect) {
        let Some(marker) = self.tree.address_mut(node) else {
            debug!(node = node.index(), "Hover on a node that is not an address marker");
            return;
        };
        marker.highlighted = true;
        let (address, network) = (marker.value.clone(), marker.network);

        self.popover
            .hover_enter(&address, network, anchor, self.viewport);
        self.stats.analyses_requested += 1;

        let aggregator = Arc::clone(&self.aggregator);
        tokio::spawn(async move {
            aggregator.analyze(&address).await;
        });
    }

    fn hover_leave(&mut self, node: NodeId) {
        if let Some(marker) = self.tree.address_mut(node) {
            marker.highlighted = false;
        }
        let Some(ticket) = self.popover.hover_leave() else {
            return;
        };

        let delay = self.popover.grace_delay();
        let tx = self.tickets_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ticket);
        });
    }
}
