//! Headless in-memory renderer.
//!
//! Holds one volume per side and plays the part of the rendering and
//! annotation library: viewport transforms, per-slice annotation sets,
//! pixel sampling and overlays. Slice requests complete after a configurable
//! number of index reads so the asynchronous load path can be exercised
//! without a display.

use std::cell::Cell;
use std::collections::BTreeMap;

use dualview_core::{
    polygon_area, Annotation, BBox, ImageGeometry, ImageId, LayerStyle, Offset, OverlayRaster,
    Renderer, RoiId, Side, ViewportState, ViewportTransform,
};

/// A stack of equally sized slices.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub width: usize,
    pub height: usize,
    pub column_pixel_spacing: f64,
    pub row_pixel_spacing: f64,
    /// Row-major pixels, one entry per slice.
    pub slices: Vec<Vec<f64>>,
}

impl Volume {
    /// Volume with every pixel set to `value`.
    #[must_use]
    pub fn filled(width: usize, height: usize, depth: usize, spacing: f64, value: f64) -> Self {
        Self::from_fn(width, height, depth, spacing, |_, _, _| value)
    }

    /// Volume whose pixel `(x, y)` of slice `z` is `f(x, y, z)`.
    #[must_use]
    pub fn from_fn<F>(width: usize, height: usize, depth: usize, spacing: f64, f: F) -> Self
    where
        F: Fn(usize, usize, usize) -> f64,
    {
        let slices = (0..depth)
            .map(|z| {
                (0..height)
                    .flat_map(|y| (0..width).map(move |x| (x, y)))
                    .map(|(x, y)| f(x, y, z))
                    .collect()
            })
            .collect();
        Self {
            width,
            height,
            column_pixel_spacing: spacing,
            row_pixel_spacing: spacing,
            slices,
        }
    }

    /// Number of slices.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slices.len()
    }

    /// Pixel grid of one slice.
    #[must_use]
    pub fn geometry(&self) -> ImageGeometry {
        ImageGeometry {
            columns: self.width,
            rows: self.height,
            column_pixel_spacing: self.column_pixel_spacing,
            row_pixel_spacing: self.row_pixel_spacing,
        }
    }

    /// Pixel value, 0 outside the volume.
    fn pixel(&self, z: usize, x: i32, y: i32) -> f64 {
        let (Ok(x), Ok(y)) = (usize::try_from(x), usize::try_from(y)) else {
            return 0.0;
        };
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.slices
            .get(z)
            .and_then(|s| s.get(y * self.width + x))
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug)]
struct Pane {
    volume: Volume,
    image_ids: Vec<ImageId>,
    enabled: bool,
    current: Cell<usize>,
    /// Requested slice and the number of reads still needed to reach it.
    pending: Cell<Option<(usize, u32)>>,
    transform: ViewportTransform,
    annotations: BTreeMap<usize, Vec<Annotation>>,
    style: Option<LayerStyle>,
    overlay: Option<OverlayRaster>,
    redraws: usize,
}

impl Pane {
    fn new(side: Side, volume: Volume) -> Self {
        let image_ids = (0..volume.depth())
            .map(|z| ImageId::new(format!("{side}:{z}")))
            .collect();
        Self {
            volume,
            image_ids,
            enabled: true,
            current: Cell::new(0),
            pending: Cell::new(None),
            transform: ViewportTransform::default(),
            annotations: BTreeMap::new(),
            style: None,
            overlay: None,
            redraws: 0,
        }
    }

    fn slice_annotations(&self) -> &[Annotation] {
        self.annotations
            .get(&self.current.get())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn slice_annotations_mut(&mut self) -> &mut Vec<Annotation> {
        self.annotations.entry(self.current.get()).or_default()
    }
}

/// In-memory [`Renderer`].
#[derive(Debug)]
pub struct MemoryRenderer {
    left: Pane,
    right: Pane,
    load_latency: u32,
    sample_calls: Cell<usize>,
    cursor_syncs: usize,
}

impl MemoryRenderer {
    /// Shows `left` and `right`, both at slice 0.
    #[must_use]
    pub fn new(left: Volume, right: Volume) -> Self {
        Self {
            left: Pane::new(Side::Left, left),
            right: Pane::new(Side::Right, right),
            load_latency: 0,
            sample_calls: Cell::new(0),
            cursor_syncs: 0,
        }
    }

    /// Number of extra index reads before a requested slice is reported.
    #[must_use]
    pub fn with_load_latency(mut self, reads: u32) -> Self {
        self.load_latency = reads;
        self
    }

    fn pane(&self, side: Side) -> &Pane {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn pane_mut(&mut self, side: Side) -> &mut Pane {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Enables or disables a side; a disabled side reports nothing.
    pub fn set_enabled(&mut self, side: Side, enabled: bool) {
        self.pane_mut(side).enabled = enabled;
    }

    /// Jumps straight to a slice, as a user scroll would.
    pub fn scroll_to(&mut self, side: Side, index: usize) {
        let pane = self.pane_mut(side);
        pane.pending.set(None);
        pane.current.set(index.min(pane.volume.depth().saturating_sub(1)));
    }

    /// Draws a polygon on the displayed slice.
    pub fn draw(&mut self, side: Side, annotation: Annotation) {
        self.add_annotation(side, annotation);
    }

    /// Moves an existing polygon, returning whether it was found.
    pub fn edit_points(&mut self, side: Side, uuid: &RoiId, points: Vec<Offset>) -> bool {
        let Some(a) = self
            .pane_mut(side)
            .slice_annotations_mut()
            .iter_mut()
            .find(|a| &a.uuid == uuid)
        else {
            return false;
        };
        a.area = polygon_area(&points);
        a.stats.area = a.area;
        a.points = points;
        true
    }

    /// Overlay last handed to a side.
    #[must_use]
    pub fn overlay(&self, side: Side) -> Option<&OverlayRaster> {
        self.pane(side).overlay.as_ref()
    }

    /// Layer style last applied to a side.
    #[must_use]
    pub fn layer_style(&self, side: Side) -> Option<LayerStyle> {
        self.pane(side).style
    }

    /// Number of redraw requests received by a side.
    #[must_use]
    pub fn redraw_count(&self, side: Side) -> usize {
        self.pane(side).redraws
    }

    /// Number of cursor-handle synchronizations.
    #[must_use]
    pub fn cursor_syncs(&self) -> usize {
        self.cursor_syncs
    }

    /// Number of `sample_pixels` calls so far.
    #[must_use]
    pub fn sample_calls(&self) -> usize {
        self.sample_calls.get()
    }

    /// Stack size and pixel grid of a side, for reporting.
    #[must_use]
    pub fn describe(&self, side: Side) -> (usize, ImageGeometry) {
        let volume = &self.pane(side).volume;
        (volume.depth(), volume.geometry())
    }

    /// Fresh viewport states synchronized with what this renderer shows.
    #[must_use]
    pub fn viewport_states(&self) -> (ViewportState, ViewportState) {
        let mut left = ViewportState::new(Side::Left);
        let mut right = ViewportState::new(Side::Right);
        left.refresh_from(self);
        right.refresh_from(self);
        (left, right)
    }
}

impl Renderer for MemoryRenderer {
    fn viewport_transform(&self, side: Side) -> Option<ViewportTransform> {
        let pane = self.pane(side);
        pane.enabled.then_some(pane.transform)
    }

    fn set_viewport_transform(&mut self, side: Side, transform: ViewportTransform) {
        self.pane_mut(side).transform = transform;
    }

    fn image_geometry(&self, side: Side) -> Option<ImageGeometry> {
        let pane = self.pane(side);
        pane.enabled.then(|| pane.volume.geometry())
    }

    fn current_slice_index(&self, side: Side) -> Option<usize> {
        let pane = self.pane(side);
        if !pane.enabled {
            return None;
        }
        match pane.pending.get() {
            Some((target, 0)) => {
                pane.current.set(target);
                pane.pending.set(None);
            }
            Some((target, remaining)) => pane.pending.set(Some((target, remaining - 1))),
            None => {}
        }
        Some(pane.current.get())
    }

    fn stack_size(&self, side: Side) -> Option<usize> {
        let pane = self.pane(side);
        pane.enabled.then(|| pane.volume.depth())
    }

    fn request_slice_index(&mut self, side: Side, index: usize) {
        let latency = self.load_latency;
        let pane = self.pane_mut(side);
        if index < pane.volume.depth() {
            pane.pending.set(Some((index, latency)));
        }
    }

    fn annotations(&self, side: Side) -> Vec<Annotation> {
        let pane = self.pane(side);
        if !pane.enabled {
            return Vec::new();
        }
        pane.slice_annotations().to_vec()
    }

    fn add_annotation(&mut self, side: Side, annotation: Annotation) {
        self.pane_mut(side).slice_annotations_mut().push(annotation);
    }

    fn remove_annotation(&mut self, side: Side, uuid: &RoiId) -> bool {
        let list = self.pane_mut(side).slice_annotations_mut();
        let before = list.len();
        list.retain(|a| &a.uuid != uuid);
        list.len() != before
    }

    fn clear_annotations(&mut self, side: Side) {
        self.pane_mut(side).annotations.clear();
    }

    fn set_annotation_visible(&mut self, side: Side, uuid: &RoiId, visible: bool) {
        if let Some(a) = self
            .pane_mut(side)
            .slice_annotations_mut()
            .iter_mut()
            .find(|a| &a.uuid == uuid)
        {
            a.visible = visible;
        }
    }

    fn sample_pixels(&self, side: Side, bbox: &BBox) -> Vec<f64> {
        self.sample_calls.set(self.sample_calls.get() + 1);
        let pane = self.pane(side);
        let z = pane.current.get();
        let mut out = Vec::with_capacity(bbox.area());
        for y in bbox.top..bbox.top + bbox.height.max(0) {
            for x in bbox.left..bbox.left + bbox.width.max(0) {
                out.push(pane.volume.pixel(z, x, y));
            }
        }
        out
    }

    fn image_identity(&self, side: Side) -> Option<ImageId> {
        let pane = self.pane(side);
        if !pane.enabled {
            return None;
        }
        pane.image_ids.get(pane.current.get()).cloned()
    }

    fn sync_cursor_handles(&mut self, _from: Side, _to: Side) {
        self.cursor_syncs += 1;
    }

    fn redraw(&mut self, side: Side) {
        self.pane_mut(side).redraws += 1;
    }

    fn set_overlay(&mut self, side: Side, overlay: OverlayRaster) {
        self.pane_mut(side).overlay = Some(overlay);
    }

    fn set_layer_style(&mut self, side: Side, style: &LayerStyle) {
        self.pane_mut(side).style = Some(*style);
    }

    fn replace_slice_image(&mut self, side: Side, index: usize, image: ImageId) {
        if let Some(slot) = self.pane_mut(side).image_ids.get_mut(index) {
            *slot = image;
        }
    }
}
