//! Popover placement
//!
//! Anchors are given in viewport coordinates (as the host's bounding-rect
//! query reports them); placements are returned in page coordinates.

use serde::{Deserialize, Serialize};

use crate::config::PopoverConfig;

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub left: f64,
    /// Top edge
    pub top: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Rect {
    /// Create a rectangle
    #[must_use]
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Right edge
    #[must_use]
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    /// Bottom edge
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Visible window and its scroll offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Visible width
    pub width: f64,
    /// Visible height
    pub height: f64,
    /// Horizontal scroll offset
    pub scroll_x: f64,
    /// Vertical scroll offset
    pub scroll_y: f64,
}

impl Viewport {
    /// Unscrolled viewport
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    /// Same viewport scrolled to (`x`, `y`)
    #[must_use]
    pub fn scrolled(mut self, x: f64, y: f64) -> Self {
        self.scroll_x = x;
        self.scroll_y = y;
        self
    }
}

/// Where the popover goes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    /// Page-coordinate box
    pub rect: Rect,
    /// Moved left to fit the viewport
    pub shifted: bool,
    /// Placed above the anchor instead of below
    pub flipped: bool,
}

/// Placement parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    /// Popover width
    pub width: f64,
    /// Popover height
    pub height: f64,
    /// Gap between anchor and popover
    pub gap: f64,
    /// Margin kept from the right edge after a shift
    pub margin: f64,
}

impl Default for Layout {
    fn default() -> Self {
        Self::from(&PopoverConfig::default())
    }
}

impl From<&PopoverConfig> for Layout {
    fn from(config: &PopoverConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            gap: config.anchor_gap,
            margin: config.viewport_margin,
        }
    }
}

/// Place a popover below-left of `anchor`, shifted left on right overflow
/// and flipped above on bottom overflow.
#[must_use]
pub fn place(anchor: Rect, viewport: Viewport, layout: Layout) -> Placement {
    let mut left = anchor.left;
    let mut top = anchor.bottom() + layout.gap;
    let mut shifted = false;
    let mut flipped = false;

    if left + layout.width > viewport.width {
        left = (viewport.width - layout.width - layout.margin).max(0.0);
        shifted = true;
    }
    if top + layout.height > viewport.height {
        top = anchor.top - layout.height - layout.gap;
        flipped = true;
    }

    Placement {
        rect: Rect::new(
            left + viewport.scroll_x,
            top + viewport.scroll_y,
            layout.width,
            layout.height,
        ),
        shifted,
        flipped,
    }
}
