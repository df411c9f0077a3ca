//! Placement of the watermark for each anchor.
//!
//! Raster composition gets concrete pixel offsets. The video filter graph only
//! learns frame sizes while running, so it gets expressions over `W`/`H`
//! (main frame) and `w`/`h` (overlay) instead.

use super::Anchor;

/// Distance kept between the watermark and the container edges.
pub const PADDING: i64 = 20;

/// Top-left corner of the watermark. May be negative when the watermark is
/// larger than the container; the compositor clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub top: i64,
    pub left: i64,
}

/// Overlay position for the transcoder, as `x`/`y` expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionExpr {
    pub x: String,
    pub y: String,
}

impl PositionExpr {
    /// `x:y`, the argument form of the overlay filter.
    pub fn overlay_arg(&self) -> String {
        format!("{}:{}", self.x, self.y)
    }
}

pub fn resolve_offset(
    container_width: u32,
    container_height: u32,
    mark_width: u32,
    mark_height: u32,
    anchor: Anchor,
) -> Offset {
    let free_x = container_width as i64 - mark_width as i64;
    let free_y = container_height as i64 - mark_height as i64;

    let (top, left) = match anchor {
        Anchor::TopLeft => (PADDING, PADDING),
        Anchor::TopCenter => (PADDING, half(free_x)),
        Anchor::TopRight => (PADDING, free_x - PADDING),
        Anchor::Center => (half(free_y), half(free_x)),
        Anchor::BottomLeft => (free_y - PADDING, PADDING),
        Anchor::BottomCenter => (free_y - PADDING, half(free_x)),
        Anchor::BottomRight => (free_y - PADDING, free_x - PADDING),
    };

    Offset { top, left }
}

pub fn resolve_expression(anchor: Anchor) -> PositionExpr {
    let edge = PADDING.to_string();
    let centered_x = "(W-w)/2".to_string();
    let centered_y = "(H-h)/2".to_string();
    let far_x = format!("W-w-{PADDING}");
    let far_y = format!("H-h-{PADDING}");

    let (y, x) = match anchor {
        Anchor::TopLeft => (edge.clone(), edge),
        Anchor::TopCenter => (edge, centered_x),
        Anchor::TopRight => (edge, far_x),
        Anchor::Center => (centered_y, centered_x),
        Anchor::BottomLeft => (far_y, edge),
        Anchor::BottomCenter => (far_y, centered_x),
        Anchor::BottomRight => (far_y, far_x),
    };

    PositionExpr { x, y }
}

/// Halve, rounding .5 upward.
fn half(value: i64) -> i64 {
    (value + 1).div_euclid(2)
}
