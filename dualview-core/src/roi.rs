//! Region-of-interest records, annotation snapshots and diff cache entries.

use std::fmt;

use crate::geometry::{points_equal, Offset};
use crate::viewport::Side;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Globally unique identifier of one ROI record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RoiId(String);

impl RoiId {
    /// Allocates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps an identifier issued by the drawing tool.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identity of the image currently displayed on a side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ImageId(String);

impl ImageId {
    /// Wraps an identity issued by the renderer.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Intensity statistics measured by the drawing tool for one ROI.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoiStats {
    /// Number of pixels inside the polygon.
    pub count: usize,
    /// Mean pixel intensity.
    pub mean: f64,
    /// Intensity variance.
    pub variance: f64,
    /// Polygon area.
    pub area: f64,
}

/// One sampled pixel inside a polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiffPoint {
    pub x: i32,
    pub y: i32,
    /// Intensity on the left image.
    pub left: f64,
    /// Intensity on the right image (resampled onto the left grid if needed).
    pub right: f64,
    /// Always `left - right`.
    pub diff: f64,
    /// Linear index into the owning side's image raster.
    pub index: usize,
}

impl DiffPoint {
    /// Creates a point, deriving `diff` from the two intensities.
    #[must_use]
    pub fn new(x: i32, y: i32, left: f64, right: f64, index: usize) -> Self {
        Self {
            x,
            y,
            left,
            right,
            diff: left - right,
            index,
        }
    }
}

/// Cached difference data for one ROI.
///
/// Only valid while `source_image_id` and `points` still match the owning
/// ROI; see [`DiffData::is_valid_for`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiffData {
    pub array: Vec<DiffPoint>,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    /// Polygon the data was computed for.
    pub points: Vec<Offset>,
    /// Image identity the data was computed against.
    pub source_image_id: Option<ImageId>,
}

impl DiffData {
    /// Cache-validity rule: same image identity and point-wise equal polygon.
    #[must_use]
    pub fn is_valid_for(&self, image_id: Option<&ImageId>, points: &[Offset]) -> bool {
        self.source_image_id.as_ref() == image_id && points_equal(&self.points, points)
    }

    /// True when the diff range collapses to a single value.
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        self.max == self.min
    }

    /// Maps a diff value onto `0..=255`.
    ///
    /// Returns `None` for a uniform range: there is no scale to normalise
    /// against.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn normalize(&self, diff: f64) -> Option<u8> {
        if self.is_uniform() || !self.min.is_finite() || !self.max.is_finite() {
            return None;
        }
        let scaled = ((diff - self.min) / (self.max - self.min)) * 255.0;
        if !scaled.is_finite() {
            return None;
        }
        Some(scaled.floor().clamp(0.0, 255.0) as u8)
    }
}

/// A ROI owned by one viewport at one slice.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoiRecord {
    pub uuid: RoiId,
    /// Shared by a ROI and its mirrored copy on the other side.
    pub correlation: RoiId,
    pub points: Vec<Offset>,
    pub stats: RoiStats,
    pub diff_data: Option<DiffData>,
}

impl RoiRecord {
    /// Builds a record from an annotation snapshot (deep copy, no diff data).
    #[must_use]
    pub fn from_annotation(annotation: &Annotation) -> Self {
        Self {
            uuid: annotation.uuid.clone(),
            correlation: annotation.correlation.clone(),
            points: annotation.points.clone(),
            stats: annotation.stats,
            diff_data: None,
        }
    }

    /// Cached diff data, if any was ever computed and it is non-empty.
    #[must_use]
    pub fn non_empty_diff(&self) -> Option<&DiffData> {
        self.diff_data.as_ref().filter(|d| !d.array.is_empty())
    }
}

/// Snapshot of one polygon as held by the drawing tool.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Annotation {
    pub uuid: RoiId,
    pub correlation: RoiId,
    pub points: Vec<Offset>,
    /// Area as reported by the drawing tool.
    pub area: f64,
    /// The drawing tool considers the polygon closable.
    pub closable: bool,
    pub visible: bool,
    pub stats: RoiStats,
}

impl Annotation {
    /// A freshly drawn polygon: its correlation is its own id.
    #[must_use]
    pub fn new(uuid: RoiId, points: Vec<Offset>) -> Self {
        let area = crate::geometry::polygon_area(&points);
        Self {
            correlation: uuid.clone(),
            uuid,
            points,
            area,
            closable: false,
            visible: true,
            stats: RoiStats {
                area,
                ..RoiStats::default()
            },
        }
    }

    /// Sets the closable flag.
    #[must_use]
    pub fn with_closable(mut self, closable: bool) -> Self {
        self.closable = closable;
        self
    }

    /// Sets the measured intensity statistics.
    #[must_use]
    pub fn with_stats(mut self, stats: RoiStats) -> Self {
        self.stats = stats;
        self
    }

    /// Whether the polygon is complete enough to be recorded.
    #[must_use]
    pub fn qualifies(&self, area_epsilon: f64) -> bool {
        self.area >= area_epsilon || self.closable
    }
}

/// Scope used for statistics, data queries and clearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum RegionScope {
    /// The most recently edited ROI only.
    #[default]
    LastRoi,
    /// Every ROI on the current slice.
    Slice,
    /// Every ROI in the volume.
    Volume,
}

/// Correlation of the most recently edited ROI and the side that edited it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastEdit {
    pub side: Side,
    pub correlation: RoiId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff_data(min: f64, max: f64) -> DiffData {
        DiffData {
            array: Vec::new(),
            min,
            max,
            sum: 0.0,
            points: vec![Offset::new(1.0, 1.0)],
            source_image_id: Some(ImageId::new("a")),
        }
    }

    #[test]
    fn test_diff_point_sign() {
        let p = DiffPoint::new(3, 4, 10.0, 25.0, 7);
        assert!((p.diff + 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalize_range() {
        let data = diff_data(-10.0, 10.0);
        assert_eq!(data.normalize(-10.0), Some(0));
        assert_eq!(data.normalize(0.0), Some(127));
        assert_eq!(data.normalize(10.0), Some(255));
    }

    #[test]
    fn test_normalize_uniform_is_none() {
        let data = diff_data(4.0, 4.0);
        assert!(data.is_uniform());
        assert_eq!(data.normalize(4.0), None);
    }

    #[test]
    fn test_cache_validity() {
        let data = diff_data(0.0, 1.0);
        let id = ImageId::new("a");
        assert!(data.is_valid_for(Some(&id), &[Offset::new(1.0, 1.0)]));
        assert!(!data.is_valid_for(Some(&ImageId::new("b")), &[Offset::new(1.0, 1.0)]));
        assert!(!data.is_valid_for(None, &[Offset::new(1.0, 1.0)]));
        assert!(!data.is_valid_for(Some(&id), &[Offset::new(1.0, 2.0)]));
    }

    #[test]
    fn test_annotation_qualifies() {
        let tiny = Annotation::new(RoiId::new("t"), vec![Offset::new(0.0, 0.0)]);
        assert!(!tiny.qualifies(0.1));
        assert!(tiny.clone().with_closable(true).qualifies(0.1));
        assert_eq!(tiny.correlation, tiny.uuid);
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(RoiId::generate(), RoiId::generate());
    }
}
