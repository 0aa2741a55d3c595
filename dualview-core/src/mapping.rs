//! Pixel-coordinate mapping between the two sides.
//!
//! A point `p` on side A maps to side B as
//!
//! ```text
//! q = ratio * (p - centre_A + offset_A) + centre_B - offset_B
//! ratio = spacing_A / spacing_B
//! ```
//!
//! where `offset` is each side's cumulative manual alignment `(dx, dy)`.
//! Each side's offset is anchored on that side, so the mapping B→A built with
//! the roles swapped is the exact inverse of A→B.

use crate::backend::{ImageGeometry, Renderer};
use crate::error::{Error, Result};
use crate::geometry::Offset;
use crate::viewport::ViewportState;

/// Affine map from one side's pixel grid to the other's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapping {
    /// Source pixels per target pixel (`spacing_from / spacing_to`).
    pub ratio: f64,
    pub from_center: Offset,
    pub to_center: Offset,
    pub from_offset: Offset,
    pub to_offset: Offset,
}

impl CoordinateMapping {
    /// Identity mapping between two equal grids.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            ratio: 1.0,
            from_center: Offset::default(),
            to_center: Offset::default(),
            from_offset: Offset::default(),
            to_offset: Offset::default(),
        }
    }

    /// Builds the mapping from explicit geometry and offsets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpacing`] when a column spacing is not a
    /// strictly positive finite number.
    pub fn new(
        from: &ImageGeometry,
        from_offset: Offset,
        to: &ImageGeometry,
        to_offset: Offset,
    ) -> Result<Self> {
        for spacing in [from.column_pixel_spacing, to.column_pixel_spacing] {
            if !(spacing.is_finite() && spacing > 0.0) {
                return Err(Error::InvalidSpacing(spacing));
            }
        }
        Ok(Self {
            ratio: from.column_pixel_spacing / to.column_pixel_spacing,
            from_center: from.center(),
            to_center: to.center(),
            from_offset,
            to_offset,
        })
    }

    /// Builds the mapping from `from` to `from.other()` using the renderer's
    /// geometry and the viewports' cumulative offsets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingGeometry`] when either side has no image yet.
    pub fn between<R: Renderer + ?Sized>(
        renderer: &R,
        from: &ViewportState,
        to: &ViewportState,
    ) -> Result<Self> {
        let from_geometry = renderer
            .image_geometry(from.side())
            .ok_or(Error::MissingGeometry(from.side()))?;
        let to_geometry = renderer
            .image_geometry(to.side())
            .ok_or(Error::MissingGeometry(to.side()))?;
        Self::new(&from_geometry, from.offset(), &to_geometry, to.offset())
    }

    /// Maps one point.
    #[must_use]
    pub fn apply(&self, p: Offset) -> Offset {
        Offset::new(
            self.ratio * (p.x - self.from_center.x + self.from_offset.x) + self.to_center.x
                - self.to_offset.x,
            self.ratio * (p.y - self.from_center.y + self.from_offset.y) + self.to_center.y
                - self.to_offset.y,
        )
    }

    /// Maps a polygon.
    #[must_use]
    pub fn apply_all(&self, points: &[Offset]) -> Vec<Offset> {
        points.iter().map(|p| self.apply(*p)).collect()
    }

    /// The mapping in the opposite direction.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            ratio: 1.0 / self.ratio,
            from_center: self.to_center,
            to_center: self.from_center,
            from_offset: self.to_offset,
            to_offset: self.from_offset,
        }
    }

    /// True when both grids have the same physical pixel size.
    #[must_use]
    pub fn is_unit_scale(&self) -> bool {
        self.ratio == 1.0
    }
}
