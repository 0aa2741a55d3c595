//! Cache-validated per-pixel difference between the two sides.
//!
//! Every ROI on one side's current slice carries an optional [`DiffData`]
//! cache entry. An entry is reused only while it was computed against the
//! side's current image identity and the ROI's current polygon; otherwise the
//! pixels under the polygon are sampled on both sides and the difference is
//! recomputed. The result is rendered into an 8-bit overlay raster.

use dualview_core::{
    bounding_box, point_in_polygon, rescale_bounding_box, BBox, CoordinateMapping, DiffData,
    DiffPoint, Error, ImageGeometry, ImageId, Offset, OverlayRaster, Renderer, Resampler, Result,
    Side, ViewportState, WindowSize,
};
use log::{debug, warn};

/// What one [`DiffComputer::compute`] pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffOutcome {
    /// Overlay for the side; `None` while the side shows no slice.
    pub overlay: Option<OverlayRaster>,
    /// ROIs whose cache entry was rebuilt.
    pub recomputed: usize,
    /// ROIs whose cache entry was still valid.
    pub reused: usize,
    /// ROIs left without valid data (other side unavailable or a sampling
    /// error).
    pub skipped: usize,
    /// ROIs left out of the overlay because their diff range is uniform.
    pub uniform: usize,
}

impl DiffOutcome {
    /// True when any cache entry changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.recomputed > 0
    }
}

/// Computes difference data and overlays for one side at a time.
pub struct DiffComputer<'a, S: Resampler + ?Sized> {
    resampler: &'a S,
}

impl<'a, S: Resampler + ?Sized> DiffComputer<'a, S> {
    /// Creates a computer using `resampler` for spacing mismatches.
    pub fn new(resampler: &'a S) -> Self {
        Self { resampler }
    }

    /// Refreshes the cache of every ROI on `this` side's current slice and
    /// renders the overlay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingGeometry`] when `this` side shows a slice but
    /// reports no image geometry.
    pub fn compute<R: Renderer + ?Sized>(
        &self,
        renderer: &R,
        this: &mut ViewportState,
        other: &ViewportState,
    ) -> Result<DiffOutcome> {
        let side = this.side();
        let mut outcome = DiffOutcome::default();
        let Some(slice) = renderer.current_slice_index(side) else {
            return Ok(outcome);
        };
        let geometry = renderer
            .image_geometry(side)
            .ok_or(Error::MissingGeometry(side))?;
        let image_id = renderer.image_identity(side);
        let mapping = match CoordinateMapping::between(renderer, this, other) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                debug!("{side}: no mapping to {}: {e}", other.side());
                None
            }
        };

        let mut overlay = OverlayRaster::new(geometry.columns, geometry.rows);
        let Some(records) = this.slice_rois_mut(slice) else {
            outcome.overlay = Some(overlay);
            return Ok(outcome);
        };

        for record in records.values_mut() {
            let valid = record
                .diff_data
                .as_ref()
                .is_some_and(|d| d.is_valid_for(image_id.as_ref(), &record.points));
            if valid {
                outcome.reused += 1;
            } else if let Some(mapping) = &mapping {
                match self.sample_difference(
                    renderer,
                    side,
                    &geometry,
                    &record.points,
                    mapping,
                    image_id.as_ref(),
                ) {
                    Ok(data) => {
                        record.diff_data = Some(data);
                        outcome.recomputed += 1;
                    }
                    Err(e) => {
                        warn!("{side}: difference for ROI {} failed: {e}", record.uuid);
                        record.diff_data = None;
                        outcome.skipped += 1;
                        continue;
                    }
                }
            } else {
                outcome.skipped += 1;
                continue;
            }

            let Some(data) = record.diff_data.as_ref() else {
                continue;
            };
            if data.array.is_empty() {
                continue;
            }
            if data.is_uniform() {
                warn!(
                    "{side}: ROI {} has a uniform difference of {}, left out of the overlay",
                    record.uuid, data.min
                );
                outcome.uniform += 1;
                continue;
            }
            for p in &data.array {
                let Some(value) = data.normalize(p.diff) else {
                    continue;
                };
                if let Some(pixel) = overlay.data.get_mut(p.index) {
                    *pixel = value;
                }
            }
        }

        debug!(
            "{side} slice {slice}: {} recomputed, {} reused, {} skipped",
            outcome.recomputed, outcome.reused, outcome.skipped
        );
        outcome.overlay = Some(overlay);
        Ok(outcome)
    }

    /// Samples both sides under `points` and builds a fresh cache entry.
    #[allow(clippy::cast_sign_loss)]
    fn sample_difference<R: Renderer + ?Sized>(
        &self,
        renderer: &R,
        side: Side,
        geometry: &ImageGeometry,
        points: &[Offset],
        mapping: &CoordinateMapping,
        image_id: Option<&ImageId>,
    ) -> Result<DiffData> {
        let bbox = bounding_box(points);
        let mut data = DiffData {
            array: Vec::new(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            points: points.to_vec(),
            source_image_id: image_id.cloned(),
        };
        if bbox.is_empty() {
            return Ok(data);
        }

        let own = renderer.sample_pixels(side, &bbox);
        let other_box = rescale_bounding_box(&bbox, |p| mapping.apply(p));
        let mut other = renderer.sample_pixels(side.other(), &other_box);
        let (from, to) = (WindowSize::of(&other_box), WindowSize::of(&bbox));
        if !mapping.is_unit_scale() || from != to {
            other = self.resampler.resample(&other, from, to)?;
        }

        let image = geometry.full_bbox();
        let mut index = 0usize;
        for y in bbox.top..bbox.top + bbox.height {
            for x in bbox.left..bbox.left + bbox.width {
                let at = index;
                index += 1;
                let p = Offset::new(f64::from(x), f64::from(y));
                if !in_image(&image, x, y) || !point_in_polygon(points, p, Some(&bbox)) {
                    continue;
                }
                let (Some(&mine), Some(&theirs)) = (own.get(at), other.get(at)) else {
                    continue;
                };
                let (left, right) = match side {
                    Side::Left => (mine, theirs),
                    Side::Right => (theirs, mine),
                };
                let point = DiffPoint::new(
                    x,
                    y,
                    left,
                    right,
                    y as usize * geometry.columns + x as usize,
                );
                data.min = data.min.min(point.diff);
                data.max = data.max.max(point.diff);
                data.sum += point.diff;
                data.array.push(point);
            }
        }
        Ok(data)
    }
}

/// Whether pixel `(x, y)` lies on the image grid.
fn in_image(image: &BBox, x: i32, y: i32) -> bool {
    x >= image.left && x < image.right && y >= image.top && y < image.bottom
}
