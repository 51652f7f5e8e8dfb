//! Pixel-space rectangles and render scales.
//!
//! Layouts match the host's `OfxRectI` / `OfxPointD` so values can be passed
//! across the plugin boundary unchanged.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Integer pixel rectangle, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct RectI {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl RectI {
    /// Create a new rectangle from its corners.
    #[inline]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Rectangle anchored at the origin with the given size.
    #[inline]
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Width in pixels (zero for inverted rectangles).
    #[inline]
    pub fn width(self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    /// Height in pixels (zero for inverted rectangles).
    #[inline]
    pub fn height(self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    /// True when the rectangle covers no pixels.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Number of pixels covered.
    #[inline]
    pub fn area(self) -> usize {
        self.width() as usize * self.height() as usize
    }
}

/// Double-precision 2D point, used for render scales.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct PointD {
    pub x: f64,
    pub y: f64,
}

impl PointD {
    /// Unit render scale.
    pub const ONE: Self = Self { x: 1.0, y: 1.0 };

    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Exactly 1.0 on both axes. No tolerance: any continuous scaling is rejected.
    #[inline]
    pub fn is_unit(self) -> bool {
        self.x == 1.0 && self.y == 1.0
    }
}
