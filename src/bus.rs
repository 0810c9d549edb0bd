//! Cross-surface broadcast channel
//!
//! Any number of independent surfaces (the page overlay, a summary panel, the
//! CLI) subscribe to the same stream of events. Delivery is best-effort: a
//! surface that is not subscribed when an event is published never sees it,
//! and a surface that falls behind the buffer skips what it missed.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::analysis::AnalysisRecord;
use crate::detect::NetworkTag;

/// Default number of buffered events per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// An address found during reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DetectedAddress {
    /// Address text
    pub address: String,
    /// Network tag
    pub network: NetworkTag,
}

/// A finished analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisEvent {
    /// Address as requested
    pub address: String,
    /// Normalized record
    pub record: Arc<AnalysisRecord>,
}

impl AnalysisEvent {
    /// Whether this event is about `address`; see [`NetworkTag::same_address`]
    #[must_use]
    pub fn concerns(&self, address: &str) -> bool {
        NetworkTag::same_address(&self.address, address)
    }
}

/// Events carried on the bus
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BusEvent {
    /// A subtree was reconciled and contained these addresses
    AddressesDetected(Vec<DetectedAddress>),
    /// An aggregation completed
    AnalysisReady(AnalysisEvent),
}

/// Broadcast bus shared by the aggregator and every UI surface
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus with the given per-subscriber buffer
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published from now on
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: BusEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => {
                trace!(receivers = n, "Published bus event");
                n
            }
            Err(_) => {
                debug!("Bus event dropped, no subscribers");
                0
            }
        }
    }

    /// Current subscriber count
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One surface's view of the bus
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<BusEvent>,
}

impl Subscription {
    /// Next event. Lagged events are skipped; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the analysis of `address`, ignoring everything else.
    ///
    /// Returns `None` if the bus closes or this subscriber lags, since the
    /// awaited event may have been among the skipped ones.
    pub async fn analysis_for(&mut self, address: &str) -> Option<Arc<AnalysisRecord>> {
        loop {
            match self.rx.recv().await {
                Ok(BusEvent::AnalysisReady(event)) if event.concerns(address) => {
                    return Some(event.record);
                }
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    }
}
