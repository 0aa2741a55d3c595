//! Region and volume statistics.
//!
//! Difference statistics come from the cached [`DiffPoint`]s of the selected
//! region; each side's own statistics come from the intensity stats the
//! drawing tool (or [`measure_region`]) stored on every ROI.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use dualview_core::{
    bounding_box, point_in_polygon, polygon_area, DiffPoint, LastEdit, Offset, RegionScope,
    Renderer, RoiRecord, RoiStats, Side, ViewportState,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Summary of one value channel over the merged points.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelStats {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl ChannelStats {
    #[allow(clippy::cast_precision_loss)]
    fn from_values(values: impl Iterator<Item = f64> + Clone) -> Option<Self> {
        let mut count = 0usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for v in values.clone() {
            count += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        let mean = sum / n;
        let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            min,
            max,
            sum,
            mean,
            std: variance.sqrt(),
        })
    }
}

/// A side's own region statistics, weighted by pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SideStats {
    pub area: f64,
    pub count: usize,
    /// `None` when no ROI reported any pixel.
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

impl SideStats {
    #[allow(clippy::cast_precision_loss)]
    fn from_records(records: &[&RoiRecord]) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut variance_sum = 0.0;
        let mut area = 0.0;
        for RoiRecord { stats, .. } in records {
            sum += stats.mean * stats.count as f64;
            variance_sum += stats.variance * stats.count as f64;
            count += stats.count;
            area += stats.area;
        }
        let (mean, std) = if count == 0 {
            (None, None)
        } else {
            let n = count as f64;
            (Some(sum / n), Some((variance_sum / n).sqrt()))
        };
        Self {
            area,
            count,
            mean,
            std,
        }
    }
}

/// Statistics of the selected region.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeStats {
    pub scope: RegionScope,
    /// Number of distinct `(x, y)` positions merged.
    pub count: usize,
    /// `left - right`.
    pub diff: ChannelStats,
    pub left: ChannelStats,
    pub right: ChannelStats,
    pub area_left: f64,
    pub area_right: f64,
    pub left_own: SideStats,
    pub right_own: SideStats,
}

/// Merges points by `(x, y)`, later entries replacing earlier ones in place.
#[must_use]
pub fn merge_points<'a>(points: impl IntoIterator<Item = &'a DiffPoint>) -> Vec<DiffPoint> {
    let mut slot: HashMap<(i32, i32), usize> = HashMap::new();
    let mut merged: Vec<DiffPoint> = Vec::new();
    for p in points {
        match slot.entry((p.x, p.y)) {
            Entry::Occupied(e) => merged[*e.get()] = *p,
            Entry::Vacant(e) => {
                e.insert(merged.len());
                merged.push(*p);
            }
        }
    }
    merged
}

/// Computes region statistics from both sides' cached diff data.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAggregator;

impl StatsAggregator {
    /// Aggregates `scope` over both viewports.
    ///
    /// Slice scope uses each side's own `stack_position`; last-ROI scope
    /// matches records by `last_edit.correlation`. In last-ROI scope only the
    /// editing side contributes difference points and its area is reported
    /// for both sides. Returns `None` when the region holds no diff points.
    #[must_use]
    pub fn aggregate(
        &self,
        left: &ViewportState,
        right: &ViewportState,
        scope: RegionScope,
        last_edit: Option<&LastEdit>,
    ) -> Option<VolumeStats> {
        let last = last_edit.map(|e| &e.correlation);
        let left_records = left.get_data(scope, left.stack_position, last);
        let right_records = right.get_data(scope, right.stack_position, last);
        if left_records.is_empty() && right_records.is_empty() {
            return None;
        }

        let only_side = match scope {
            RegionScope::LastRoi => Some(last_edit?.side),
            RegionScope::Slice | RegionScope::Volume => None,
        };
        let diff_points = |records: &[&RoiRecord]| -> Vec<DiffPoint> {
            records
                .iter()
                .filter_map(|r| r.non_empty_diff())
                .flat_map(|d| d.array.iter().copied())
                .collect()
        };
        let base = match only_side {
            Some(Side::Left) => diff_points(&left_records),
            Some(Side::Right) => diff_points(&right_records),
            None => {
                let mut all = diff_points(&left_records);
                all.extend(diff_points(&right_records));
                all
            }
        };
        let points = merge_points(&base);

        let diff = ChannelStats::from_values(points.iter().map(|p| p.diff))?;
        let left_channel = ChannelStats::from_values(points.iter().map(|p| p.left))?;
        let right_channel = ChannelStats::from_values(points.iter().map(|p| p.right))?;

        let left_own = SideStats::from_records(&left_records);
        let right_own = SideStats::from_records(&right_records);
        let area_left = if only_side == Some(Side::Right) {
            right_own.area
        } else {
            left_own.area
        };
        let area_right = if only_side == Some(Side::Left) {
            left_own.area
        } else {
            right_own.area
        };

        Some(VolumeStats {
            scope,
            count: points.len(),
            diff,
            left: left_channel,
            right: right_channel,
            area_left,
            area_right,
            left_own,
            right_own,
        })
    }
}

/// Measures intensity statistics of a polygon on one side.
///
/// Used for mirrored copies the drawing tool has not measured. Pixels
/// outside the image read as 0, as the renderer samples them.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn measure_region<R: Renderer + ?Sized>(
    renderer: &R,
    side: Side,
    points: &[Offset],
) -> RoiStats {
    let area = polygon_area(points);
    let bbox = bounding_box(points);
    if bbox.is_empty() {
        return RoiStats {
            area,
            ..RoiStats::default()
        };
    }
    let pixels = renderer.sample_pixels(side, &bbox);

    let mut inside = Vec::new();
    let mut index = 0usize;
    for y in bbox.top..bbox.bottom {
        for x in bbox.left..bbox.right {
            let p = Offset::new(f64::from(x), f64::from(y));
            if point_in_polygon(points, p, Some(&bbox)) {
                if let Some(v) = pixels.get(index) {
                    inside.push(*v);
                }
            }
            index += 1;
        }
    }
    if inside.is_empty() {
        return RoiStats {
            area,
            ..RoiStats::default()
        };
    }
    let n = inside.len() as f64;
    let mean = inside.iter().sum::<f64>() / n;
    let variance = inside.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    RoiStats {
        count: inside.len(),
        mean,
        variance,
        area,
    }
}
