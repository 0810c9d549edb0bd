//! Analysis popover
//!
//! One popover at most, anchored to the hovered address fragment and filled in
//! when the aggregator reports back.

mod content;
mod controller;
mod geometry;

pub use content::{
    InfoRow, PopoverBody, PopoverView, UNKNOWN, buy_url, format_price, format_short_number,
    short_address, time_ago,
};
pub use controller::{
    CloseReason, CloseTicket, OpenPopover, PopoverController, PopoverEvent, PopoverId,
    PopoverState,
};
pub use geometry::{Layout, Placement, Rect, Viewport, place};
