// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Popover placement.
//!
//! Positions an overlay relative to the element that opened it so that it
//! stays on screen. Anchors are in viewport coordinates (as returned by a
//! bounding-box query); the result is in document coordinates.

/// Gap between the anchor and the overlay, and minimum distance from the
/// viewport's horizontal edges.
pub const EDGE_GAP: f64 = 10.0;

/// Axis-aligned box in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    /// Whether a point lies inside the box (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Visible area of the page plus how far it is scrolled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    pub fn scrolled(mut self, scroll_x: f64, scroll_y: f64) -> Self {
        self.scroll_x = scroll_x;
        self.scroll_y = scroll_y;
        self
    }
}

/// Top-left corner of a placed overlay, in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub top: f64,
    pub left: f64,
}

/// Where the overlay ended up relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Above,
    Below,
}

/// Compute the overlay position for `anchor`.
///
/// Default is centered horizontally, `EDGE_GAP` above the anchor. Each axis
/// is clamped at most once:
/// - vertical: flips below the anchor when the top edge would be above the
///   scrolled viewport;
/// - horizontal: the right edge is pulled in to `viewport.width - EDGE_GAP`,
///   then a left edge below 0 is pushed to `EDGE_GAP`.
pub fn place(anchor: Rect, overlay: Size, viewport: Viewport) -> (Position, Side) {
    let above = anchor.top - EDGE_GAP - overlay.height;
    let (top, side) = if above < 0.0 {
        (anchor.bottom() + EDGE_GAP, Side::Below)
    } else {
        (above, Side::Above)
    };

    let mut left = anchor.center_x() - overlay.width / 2.0;
    if left + overlay.width > viewport.width - EDGE_GAP {
        left = viewport.width - EDGE_GAP - overlay.width;
    }
    if left < 0.0 {
        left = EDGE_GAP;
    }

    (
        Position {
            top: top + viewport.scroll_y,
            left: left + viewport.scroll_x,
        },
        side,
    )
}
