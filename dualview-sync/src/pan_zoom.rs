//! Pan and zoom lockstep between the two sides.

use dualview_core::{ImageGeometry, Offset, Renderer, ViewportState, ViewportTransform};
use log::debug;

/// Transform the target should adopt to follow `source`.
///
/// `ratio = target_spacing / source_spacing`; the target scale is
/// `source_scale * ratio` and its translation is
/// `(source_translation - source_offset) / ratio + target_offset`. The
/// target keeps its own rotation. Returns `None` for unusable spacing.
#[must_use]
pub fn follow_transform(
    source: &ViewportTransform,
    source_geometry: &ImageGeometry,
    source_offset: Offset,
    target: &ViewportTransform,
    target_geometry: &ImageGeometry,
    target_offset: Offset,
) -> Option<ViewportTransform> {
    let ratio = target_geometry.column_pixel_spacing / source_geometry.column_pixel_spacing;
    if !(ratio.is_finite() && ratio > 0.0) {
        return None;
    }
    Some(ViewportTransform {
        scale: source.scale * ratio,
        translation: Offset::new(
            (source.translation.x - source_offset.x) / ratio + target_offset.x,
            (source.translation.y - source_offset.y) / ratio + target_offset.y,
        ),
        rotation: target.rotation,
    })
}

/// Keeps scale and translation aligned after a viewport change.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanZoomSynchronizer;

impl PanZoomSynchronizer {
    /// Propagates the source viewport onto the target.
    ///
    /// Returns whether the target was changed. Nothing happens when source
    /// and target are the same side, when either side is indeterminate, or
    /// when the target already shows exactly the computed viewport; the last
    /// rule is what stops the two sides from re-notifying each other forever.
    pub fn synchronize<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        source: &ViewportState,
        target: &ViewportState,
    ) -> bool {
        if source.side() == target.side() {
            return false;
        }
        let (Some(src), Some(src_geom), Some(tgt), Some(tgt_geom)) = (
            renderer.viewport_transform(source.side()),
            renderer.image_geometry(source.side()),
            renderer.viewport_transform(target.side()),
            renderer.image_geometry(target.side()),
        ) else {
            return false;
        };
        let Some(next) = follow_transform(
            &src,
            &src_geom,
            source.offset(),
            &tgt,
            &tgt_geom,
            target.offset(),
        ) else {
            return false;
        };
        if next == tgt {
            return false;
        }
        debug!(
            "{} follows {}: scale {:.3}, translation ({:.2}, {:.2})",
            target.side(),
            source.side(),
            next.scale,
            next.translation.x,
            next.translation.y
        );
        renderer.set_viewport_transform(target.side(), next);
        renderer.redraw(target.side());
        true
    }
}
