//! Page geometry.
//!
//! All coordinates are in PDF user space: points, origin at the bottom-left
//! corner of the page, Y growing upwards.

use serde::{Deserialize, Serialize};

/// Slack (points) allowed when testing whether text lies inside a region.
const REGION_SLACK: f32 = 2.0;

/// Axis-aligned box around a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x0: f32,
    /// Lower edge
    pub y0: f32,
    /// Right edge
    pub x1: f32,
    /// Upper edge
    pub y1: f32,
}

impl BoundingBox {
    /// Create a bounding box, normalizing swapped edges.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Width in points.
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    /// Height in points.
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Center point.
    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Whether the two boxes share any area (touching edges count).
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1 && self.y0 <= other.y1 && other.y0 <= self.y1
    }
}

/// Rectangle on a page holding exactly one school's table.
///
/// `top` is numerically greater than `bottom` because Y grows upwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Left edge (always the page's left edge)
    pub left: f32,
    /// Upper edge: lower edge of the school anchor
    pub top: f32,
    /// Right edge: the page's right extent
    pub right: f32,
    /// Lower edge: upper edge of the notes anchor
    pub bottom: f32,
}

impl Region {
    /// Create a region.
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Height in points (zero when the anchors are inverted).
    pub fn height(&self) -> f32 {
        (self.top - self.bottom).max(0.0)
    }

    /// Whether a text box belongs to the region, judged by its center point.
    pub fn contains(&self, bbox: &BoundingBox) -> bool {
        let (cx, cy) = bbox.center();
        cx >= self.left - REGION_SLACK
            && cx <= self.right + REGION_SLACK
            && cy >= self.bottom - REGION_SLACK
            && cy <= self.top + REGION_SLACK
    }

    /// The region as a bounding box.
    pub fn as_bbox(&self) -> BoundingBox {
        BoundingBox::new(self.left, self.bottom, self.right, self.top)
    }
}
