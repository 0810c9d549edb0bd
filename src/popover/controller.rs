//! Popover state machine
//!
//! ```text
//! Closed ──hover-enter(a)──▶ Open(a)
//! Open(a) ──hover-enter(b)──▶ Open(b)      old popover destroyed first
//! Open(a) ──hover-leave──▶ grace ticket ──▶ Closed   unless pointer is inside
//! Open ──scroll | outside click | Escape──▶ Closed
//! Open(a) ──analysis for a──▶ Open(a)        refreshed in place
//! ```
//!
//! The controller never sleeps. A hover-leave hands out a [`CloseTicket`];
//! whoever drives the event loop waits `grace_delay` and then calls
//! [`PopoverController::grace_elapsed`].

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::content::PopoverView;
use super::geometry::{Layout, Placement, Rect, Viewport, place};
use crate::analysis::AnalysisRecord;
use crate::config::PopoverConfig;
use crate::detect::NetworkTag;

/// Identity of one popover element. A new id is issued on every open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PopoverId(u64);

impl PopoverId {
    /// Raw value
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Pending grace-delay close for a specific popover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseTicket {
    /// Popover the ticket was issued for
    pub id: PopoverId,
}

/// Why a popover closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Another address was hovered
    Replaced,
    /// Grace delay ran out after hover-leave
    GraceExpired,
    /// Pointer left the popover itself
    PointerLeft,
    /// Page scrolled
    Scroll,
    /// Click outside the popover
    OutsideClick,
    /// Escape key
    Escape,
}

/// The visible popover
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPopover {
    /// Element id
    pub id: PopoverId,
    /// Address the popover is anchored to
    pub address: String,
    /// Network of the anchor fragment
    pub network: NetworkTag,
    /// Position in page coordinates
    pub placement: Placement,
    /// Pointer is over the popover
    pub pointer_inside: bool,
    /// Rendered content
    pub view: PopoverView,
}

/// Controller state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PopoverState {
    /// Nothing shown
    #[default]
    Closed,
    /// Exactly one popover shown
    Open(Box<OpenPopover>),
}

/// Observable side effects, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PopoverEvent {
    /// A popover element was created
    Opened {
        /// Element id
        id: PopoverId,
        /// Anchor address
        address: String,
    },
    /// A popover element was destroyed
    Closed {
        /// Element id
        id: PopoverId,
        /// Trigger
        reason: CloseReason,
    },
    /// Content of the open popover changed
    Refreshed {
        /// Element id
        id: PopoverId,
    },
}

/// Single-instance popover controller
#[derive(Debug)]
pub struct PopoverController {
    layout: Layout,
    grace_delay: Duration,
    state: PopoverState,
    next_id: u64,
    events: Vec<PopoverEvent>,
}

impl Default for PopoverController {
    fn default() -> Self {
        Self::new(&PopoverConfig::default())
    }
}

impl PopoverController {
    /// Create a closed controller
    #[must_use]
    pub fn new(config: &PopoverConfig) -> Self {
        Self {
            layout: Layout::from(config),
            grace_delay: config.grace_delay(),
            state: PopoverState::Closed,
            next_id: 0,
            events: Vec::new(),
        }
    }

    /// Delay between hover-leave and close
    #[must_use]
    pub fn grace_delay(&self) -> Duration {
        self.grace_delay
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &PopoverState {
        &self.state
    }

    /// The open popover, if any
    #[must_use]
    pub fn current(&self) -> Option<&OpenPopover> {
        match &self.state {
            PopoverState::Open(open) => Some(open.as_ref()),
            PopoverState::Closed => None,
        }
    }

    /// Number of popover elements present (0 or 1)
    #[must_use]
    pub fn visible_count(&self) -> usize {
        usize::from(self.current().is_some())
    }

    /// Take the side effects recorded since the last drain
    pub fn drain_events(&mut self) -> Vec<PopoverEvent> {
        std::mem::take(&mut self.events)
    }

    /// Pointer entered an address fragment.
    ///
    /// Any open popover is destroyed before the new one is created, so at no
    /// point are two present.
    pub fn hover_enter(
        &mut self,
        address: &str,
        network: NetworkTag,
        anchor: Rect,
        viewport: Viewport,
    ) -> PopoverId {
        self.close(CloseReason::Replaced);

        self.next_id += 1;
        let id = PopoverId(self.next_id);
        let placement = place(anchor, viewport, self.layout);
        debug!(
            popover = id.0,
            address = %address,
            network = %network.as_str(),
            left = placement.rect.left,
            top = placement.rect.top,
            "Popover opened"
        );

        self.state = PopoverState::Open(Box::new(OpenPopover {
            id,
            address: address.to_string(),
            network,
            placement,
            pointer_inside: false,
            view: PopoverView::loading(address),
        }));
        self.events.push(PopoverEvent::Opened {
            id,
            address: address.to_string(),
        });
        id
    }

    /// Pointer left the anchor fragment; returns the ticket to redeem after
    /// [`grace_delay`](Self::grace_delay)
    pub fn hover_leave(&mut self) -> Option<CloseTicket> {
        self.current().map(|open| CloseTicket { id: open.id })
    }

    /// Pointer moved onto the popover
    pub fn pointer_enter_popover(&mut self, id: PopoverId) {
        if let PopoverState::Open(open) = &mut self.state
            && open.id == id
        {
            open.pointer_inside = true;
        }
    }

    /// Pointer left the popover; closes it
    pub fn pointer_leave_popover(&mut self, id: PopoverId) -> bool {
        if self.current().is_some_and(|open| open.id == id) {
            self.close(CloseReason::PointerLeft).is_some()
        } else {
            false
        }
    }

    /// Grace delay for `ticket` ran out. Closes only if the same popover is
    /// still open and the pointer is not over it.
    pub fn grace_elapsed(&mut self, ticket: CloseTicket) -> bool {
        let due = self
            .current()
            .is_some_and(|open| open.id == ticket.id && !open.pointer_inside);
        if due {
            self.close(CloseReason::GraceExpired).is_some()
        } else {
            debug!(popover = ticket.id.0, "Stale close ticket ignored");
            false
        }
    }

    /// Page scrolled
    pub fn scroll(&mut self) -> bool {
        self.close(CloseReason::Scroll).is_some()
    }

    /// Click somewhere on the page
    pub fn click(&mut self, inside_popover: bool) -> bool {
        if inside_popover {
            return false;
        }
        self.close(CloseReason::OutsideClick).is_some()
    }

    /// Key pressed; only `Escape` does anything
    pub fn key(&mut self, key: &str) -> bool {
        if key != "Escape" {
            return false;
        }
        self.close(CloseReason::Escape).is_some()
    }

    /// Analysis finished for `address`. Refreshes the open popover when it is
    /// anchored to that address, otherwise the record is dropped.
    pub fn analysis_ready(&mut self, address: &str, record: &AnalysisRecord) -> bool {
        let PopoverState::Open(open) = &mut self.state else {
            debug!(address = %address, "Analysis dropped: no popover open");
            return false;
        };
        if !NetworkTag::same_address(&open.address, address) {
            debug!(
                address = %address,
                open = %open.address,
                "Analysis dropped: popover shows another address"
            );
            return false;
        }

        open.view = PopoverView::from_record(&open.address, record);
        self.events.push(PopoverEvent::Refreshed { id: open.id });
        true
    }

    fn close(&mut self, reason: CloseReason) -> Option<PopoverId> {
        match std::mem::take(&mut self.state) {
            PopoverState::Open(open) => {
                debug!(popover = open.id.0, reason = ?reason, "Popover closed");
                self.events.push(PopoverEvent::Closed {
                    id: open.id,
                    reason,
                });
                Some(open.id)
            }
            PopoverState::Closed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::analysis::TokenInfo;
    use crate::popover::PopoverBody;

    const A: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
    const B: &str = "0x8617E340B3D01FA5F11F306F4090FD50E238070D";

    fn anchor() -> Rect {
        Rect::new(40.0, 100.0, 120.0, 18.0)
    }

    fn viewport() -> Viewport {
        Viewport::new(1280.0, 800.0)
    }

    fn open(ctrl: &mut PopoverController, address: &str) -> PopoverId {
        ctrl.hover_enter(address, NetworkTag::Evm, anchor(), viewport())
    }

    fn priced(address: &str, price: f64) -> AnalysisRecord {
        let mut record = AnalysisRecord::new(address);
        record.token = Some(TokenInfo {
            price: Some(price),
            ..TokenInfo::default()
        });
        record
    }

    #[test]
    fn test_hover_enter_opens_loading_popover() {
        let mut ctrl = PopoverController::default();
        let id = open(&mut ctrl, A);

        let current = ctrl.current().unwrap();
        assert_eq!(current.id, id);
        assert_eq!(current.view.body, PopoverBody::Loading);
        assert_eq!(current.placement.rect.top, 122.0);
        assert_eq!(ctrl.visible_count(), 1);
    }

    #[test]
    fn test_single_popover_invariant() {
        let mut ctrl = PopoverController::default();
        let first = open(&mut ctrl, A);
        let second = open(&mut ctrl, B);

        assert_ne!(first, second);
        assert_eq!(ctrl.visible_count(), 1);
        assert_eq!(ctrl.current().unwrap().address, B);
        assert_eq!(
            ctrl.drain_events(),
            vec![
                PopoverEvent::Opened {
                    id: first,
                    address: A.into()
                },
                PopoverEvent::Closed {
                    id: first,
                    reason: CloseReason::Replaced
                },
                PopoverEvent::Opened {
                    id: second,
                    address: B.into()
                },
            ]
        );
    }

    #[test]
    fn test_grace_close() {
        let mut ctrl = PopoverController::default();
        open(&mut ctrl, A);
        let ticket = ctrl.hover_leave().unwrap();

        assert!(ctrl.grace_elapsed(ticket));
        assert_eq!(ctrl.state(), &PopoverState::Closed);
    }

    #[test]
    fn test_pointer_inside_cancels_grace_close() {
        let mut ctrl = PopoverController::default();
        let id = open(&mut ctrl, A);
        let ticket = ctrl.hover_leave().unwrap();
        ctrl.pointer_enter_popover(id);

        assert!(!ctrl.grace_elapsed(ticket));
        assert_eq!(ctrl.visible_count(), 1);

        assert!(ctrl.pointer_leave_popover(id));
        assert_eq!(ctrl.visible_count(), 0);
    }

    #[test]
    fn test_stale_ticket_does_not_close_newer_popover() {
        let mut ctrl = PopoverController::default();
        open(&mut ctrl, A);
        let ticket = ctrl.hover_leave().unwrap();
        open(&mut ctrl, B);

        assert!(!ctrl.grace_elapsed(ticket));
        assert_eq!(ctrl.current().unwrap().address, B);
    }

    #[test]
    fn test_immediate_closes() {
        let mut ctrl = PopoverController::default();

        open(&mut ctrl, A);
        assert!(ctrl.scroll());

        open(&mut ctrl, A);
        assert!(!ctrl.click(true));
        assert!(ctrl.click(false));

        open(&mut ctrl, A);
        assert!(!ctrl.key("Enter"));
        assert!(ctrl.key("Escape"));

        assert!(!ctrl.scroll());
        assert_eq!(ctrl.visible_count(), 0);
    }

    #[test]
    fn test_analysis_refreshes_matching_popover() {
        let mut ctrl = PopoverController::default();
        let id = open(&mut ctrl, A);
        ctrl.drain_events();

        assert!(ctrl.analysis_ready(&A.to_lowercase(), &priced(A, 0.5)));
        let current = ctrl.current().unwrap();
        assert_eq!(current.view.row("Price"), Some("$0.500000"));
        assert_eq!(ctrl.drain_events(), vec![PopoverEvent::Refreshed { id }]);
    }

    #[test]
    fn test_analysis_for_other_address_is_dropped() {
        let mut ctrl = PopoverController::default();
        open(&mut ctrl, B);
        assert!(!ctrl.analysis_ready(A, &priced(A, 1.0)));
        assert_eq!(ctrl.current().unwrap().view.body, PopoverBody::Loading);
    }

    #[test]
    fn test_analysis_for_case_distinct_mint_is_dropped() {
        const MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
        let mut ctrl = PopoverController::default();
        ctrl.hover_enter(MINT, NetworkTag::Solana, anchor(), viewport());

        let other = MINT.to_lowercase();
        assert!(!ctrl.analysis_ready(&other, &priced(&other, 9.0)));
        assert_eq!(ctrl.current().unwrap().view.body, PopoverBody::Loading);
        assert!(ctrl.analysis_ready(MINT, &priced(MINT, 1.0)));
    }

    #[test]
    fn test_late_analysis_does_not_resurrect() {
        let mut ctrl = PopoverController::default();
        open(&mut ctrl, A);
        ctrl.key("Escape");

        assert!(!ctrl.analysis_ready(A, &priced(A, 1.0)));
        assert_eq!(ctrl.state(), &PopoverState::Closed);
    }

    #[test]
    fn test_hover_leave_when_closed() {
        let mut ctrl = PopoverController::default();
        assert!(ctrl.hover_leave().is_none());
        assert_eq!(ctrl.grace_delay(), Duration::from_millis(300));
    }
}
