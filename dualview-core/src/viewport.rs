//! Per-side viewport state and the ROI-by-slice store.

use std::collections::BTreeMap;
use std::fmt;

use crate::backend::{Colormap, LayerStyle, Renderer};
use crate::geometry::Offset;
use crate::roi::{Annotation, ImageId, RegionScope, RoiId, RoiRecord};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One of the two display surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Both sides, left first.
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// The opposite side.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// True for the left side.
    #[must_use]
    pub fn is_left(self) -> bool {
        matches!(self, Side::Left)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Manual alignment step applied by [`ViewportState::translate_or_rotate`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Nudge {
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Absolute rotation in degrees; `None` keeps the viewport's rotation.
    pub angle: Option<f64>,
}

/// Mutable state of one side.
///
/// `dx`/`dy`/`angle` accumulate manual or registration-derived alignment on
/// top of the renderer's own viewport transform. ROI records are stored
/// sparsely by slice index.
#[derive(Debug, Clone)]
pub struct ViewportState {
    side: Side,
    pub loaded: bool,
    pub visible: bool,
    pub opacity: f64,
    pub colormap: Colormap,
    pub angle: f64,
    pub dx: f64,
    pub dy: f64,
    pub stack_position: Option<usize>,
    pub stack_size: Option<usize>,
    pub image_id: Option<ImageId>,
    roi_by_stack: BTreeMap<usize, BTreeMap<RoiId, RoiRecord>>,
}

impl ViewportState {
    /// Default overlay opacity.
    pub const DEFAULT_OPACITY: f64 = 0.7;

    /// Creates an unloaded viewport.
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            loaded: false,
            visible: true,
            opacity: Self::DEFAULT_OPACITY,
            colormap: Colormap::default(),
            angle: 0.0,
            dx: 0.0,
            dy: 0.0,
            stack_position: None,
            stack_size: None,
            image_id: None,
            roi_by_stack: BTreeMap::new(),
        }
    }

    /// Which side this state belongs to.
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Cumulative manual offset.
    #[must_use]
    pub fn offset(&self) -> Offset {
        Offset::new(self.dx, self.dy)
    }

    /// Current layer style.
    #[must_use]
    pub fn layer_style(&self) -> LayerStyle {
        LayerStyle {
            opacity: self.opacity,
            colormap: self.colormap,
            visible: self.visible,
        }
    }

    /// Slice index reported by the renderer, `None` while indeterminate.
    pub fn current_stack_index<R: Renderer + ?Sized>(&self, renderer: &R) -> Option<usize> {
        renderer.current_slice_index(self.side)
    }

    /// Pulls slice position, stack size and image identity from the renderer.
    pub fn refresh_from<R: Renderer + ?Sized>(&mut self, renderer: &R) {
        self.stack_position = renderer.current_slice_index(self.side);
        self.stack_size = renderer.stack_size(self.side);
        self.image_id = renderer.image_identity(self.side);
        if self.stack_position.is_some() {
            self.loaded = true;
        }
    }

    /// Accumulates a manual alignment step and applies it to the renderer.
    pub fn translate_or_rotate<R: Renderer + ?Sized>(&mut self, renderer: &mut R, nudge: Nudge) {
        let Some(mut transform) = renderer.viewport_transform(self.side) else {
            return;
        };
        let x = nudge.x.unwrap_or(0.0);
        let y = nudge.y.unwrap_or(0.0);
        self.angle = nudge.angle.unwrap_or(transform.rotation);
        self.dx += x;
        self.dy += y;

        transform.rotation = self.angle;
        transform.translation.x += x;
        transform.translation.y += y;
        renderer.set_viewport_transform(self.side, transform);
        renderer.redraw(self.side);
    }

    /// Records at one slice.
    #[must_use]
    pub fn slice_rois(&self, slice: usize) -> Option<&BTreeMap<RoiId, RoiRecord>> {
        self.roi_by_stack.get(&slice)
    }

    /// Mutable records at one slice.
    pub fn slice_rois_mut(&mut self, slice: usize) -> Option<&mut BTreeMap<RoiId, RoiRecord>> {
        self.roi_by_stack.get_mut(&slice)
    }

    /// One record by slice and uuid.
    #[must_use]
    pub fn record(&self, slice: usize, uuid: &RoiId) -> Option<&RoiRecord> {
        self.roi_by_stack.get(&slice).and_then(|m| m.get(uuid))
    }

    /// Every record, ordered by slice then uuid.
    pub fn records(&self) -> impl Iterator<Item = (usize, &RoiRecord)> {
        self.roi_by_stack
            .iter()
            .flat_map(|(slice, map)| map.values().map(move |r| (*slice, r)))
    }

    /// Total number of stored records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.roi_by_stack.values().map(BTreeMap::len).sum()
    }

    /// Upserts a record by uuid with a deep copy of points and stats.
    ///
    /// An existing diff cache entry is kept; its validity is re-checked
    /// whenever it is read.
    pub fn set_points(&mut self, slice: usize, annotation: &Annotation) {
        let map = self.roi_by_stack.entry(slice).or_default();
        match map.get_mut(&annotation.uuid) {
            Some(existing) => {
                existing.correlation = annotation.correlation.clone();
                existing.points.clone_from(&annotation.points);
                existing.stats = annotation.stats;
            }
            None => {
                map.insert(
                    annotation.uuid.clone(),
                    RoiRecord::from_annotation(annotation),
                );
            }
        }
    }

    /// Records in `scope` that carry non-empty diff data.
    ///
    /// `current_slice` is consulted for [`RegionScope::Slice`] and `last` for
    /// [`RegionScope::LastRoi`]; a missing value selects nothing.
    #[must_use]
    pub fn get_data(
        &self,
        scope: RegionScope,
        current_slice: Option<usize>,
        last: Option<&RoiId>,
    ) -> Vec<&RoiRecord> {
        let with_diff = |r: &&RoiRecord| r.non_empty_diff().is_some();
        match scope {
            RegionScope::LastRoi => {
                let Some(last) = last else {
                    return Vec::new();
                };
                self.records()
                    .map(|(_, r)| r)
                    .filter(|r| &r.correlation == last)
                    .filter(with_diff)
                    .collect()
            }
            RegionScope::Slice => current_slice
                .and_then(|slice| self.roi_by_stack.get(&slice))
                .map(|map| map.values().filter(with_diff).collect())
                .unwrap_or_default(),
            RegionScope::Volume => self.records().map(|(_, r)| r).filter(with_diff).collect(),
        }
    }

    /// Clears records in `scope`, returning whether anything was removed.
    ///
    /// An unloaded viewport never changes.
    pub fn remove_data(
        &mut self,
        scope: RegionScope,
        current_slice: Option<usize>,
        last: Option<&RoiId>,
    ) -> bool {
        if !self.loaded {
            return false;
        }
        match scope {
            RegionScope::LastRoi => {
                let Some(last) = last else {
                    return false;
                };
                let mut changed = false;
                for map in self.roi_by_stack.values_mut() {
                    let before = map.len();
                    map.retain(|_, r| &r.correlation != last);
                    changed |= map.len() != before;
                }
                changed
            }
            RegionScope::Slice => {
                let Some(slice) = current_slice else {
                    return false;
                };
                self.roi_by_stack
                    .remove(&slice)
                    .is_some_and(|map| !map.is_empty())
            }
            RegionScope::Volume => {
                let changed = self.record_count() > 0;
                self.roi_by_stack.clear();
                changed
            }
        }
    }
}
