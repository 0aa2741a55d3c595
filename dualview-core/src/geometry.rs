//! Polygon geometry in image pixel space.
//!
//! All coordinates are image pixel coordinates (column, row) with the origin
//! at the top-left corner of the image.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 2-D coordinate in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Offset {
    /// Column coordinate.
    pub x: f64,
    /// Row coordinate.
    pub y: f64,
}

impl Offset {
    /// Creates a new offset.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another offset.
    #[inline]
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Offset {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Integer bounding box that fully contains a polygon.
///
/// `left`/`top` are floored and `right`/`bottom` are ceiled, so fractional
/// vertices never fall outside the box. `width`/`height` are the spans
/// `right - left` and `bottom - top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub width: i32,
    pub height: i32,
}

impl BBox {
    /// Builds a box from its edges, deriving width and height.
    #[must_use]
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            width: right - left,
            height: bottom - top,
        }
    }

    /// True when the box covers no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Number of pixels sampled over this box (`width * height`).
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }

    /// Whether the point lies inside the box, edges included.
    #[must_use]
    pub fn contains(&self, point: Offset) -> bool {
        point.x >= f64::from(self.left)
            && point.x <= f64::from(self.right)
            && point.y >= f64::from(self.top)
            && point.y <= f64::from(self.bottom)
    }

    /// The four corners in clockwise order starting at the top-left.
    #[must_use]
    pub fn corners(&self) -> [Offset; 4] {
        let (l, t) = (f64::from(self.left), f64::from(self.top));
        let (r, b) = (f64::from(self.right), f64::from(self.bottom));
        [
            Offset::new(l, t),
            Offset::new(r, t),
            Offset::new(r, b),
            Offset::new(l, b),
        ]
    }
}

/// Computes the bounding box of a polygon.
///
/// Returns the empty box for an empty point list.
#[must_use]
pub fn bounding_box(points: &[Offset]) -> BBox {
    if points.is_empty() {
        return BBox::default();
    }
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    if !min_x.is_finite() || !min_y.is_finite() || !max_x.is_finite() || !max_y.is_finite() {
        return BBox::default();
    }
    BBox::from_edges(
        floor_to_i32(min_x),
        floor_to_i32(min_y),
        ceil_to_i32(max_x),
        ceil_to_i32(max_y),
    )
}

/// Ray-casting parity test.
///
/// When `bbox` is given it is used for the early rejection instead of
/// recomputing the polygon's bounding box.
#[must_use]
pub fn point_in_polygon(polygon: &[Offset], point: Offset, bbox: Option<&BBox>) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let outside = match bbox {
        Some(b) => !b.contains(point),
        None => !bounding_box(polygon).contains(point),
    };
    if outside {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        // The first clause guarantees pi.y != pj.y, so the division is safe.
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Maps a box through an arbitrary point transform.
///
/// All four corners are transformed and the destination box is rebuilt from
/// their extremes, so rotations and non-uniform scales stay covered.
#[must_use]
pub fn rescale_bounding_box<F>(bbox: &BBox, translate: F) -> BBox
where
    F: Fn(Offset) -> Offset,
{
    let corners = bbox.corners().map(translate);
    bounding_box(&corners)
}

/// Absolute polygon area in square pixels (shoelace formula).
#[must_use]
pub fn polygon_area(points: &[Offset]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        twice += a.x * b.y - b.x * a.y;
    }
    (twice * 0.5).abs()
}

/// Point-wise equality of two polygons.
#[must_use]
pub fn points_equal(a: &[Offset], b: &[Offset]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(p, q)| p.x == q.x && p.y == q.y)
}

#[allow(clippy::cast_possible_truncation)]
fn floor_to_i32(v: f64) -> i32 {
    v.floor().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

#[allow(clippy::cast_possible_truncation)]
fn ceil_to_i32(v: f64) -> i32 {
    v.ceil().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}
