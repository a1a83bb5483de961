//! Square to overlay-space mapping.
//!
//! Overlay space is the 0..100 unit square shared by both drawing layers
//! (`viewBox="0 0 100 100"`), so a rect computed here lines up on either
//! layer without further registration.

use crate::square::Square;

/// Side of one board cell in overlay units.
pub const CELL: f64 = 100.0 / 8.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub center_x: f64,
    pub center_y: f64,
}

/// Rect of `square` in overlay space. Not mirrored: a1 is bottom-left.
/// Mirrored: a1 is top-right.
pub fn square_rect(square: Square, mirrored: bool) -> SquareRect {
    let file = f64::from(square.file());
    let rank = f64::from(square.rank());
    let (col, row) = if mirrored {
        (7.0 - file, rank - 1.0)
    } else {
        (file, 8.0 - rank)
    };
    let x = col * CELL;
    let y = row * CELL;
    SquareRect {
        x,
        y,
        width: CELL,
        height: CELL,
        center_x: x + CELL / 2.0,
        center_y: y + CELL / 2.0,
    }
}
