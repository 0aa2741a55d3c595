//! Interfaces of the external collaborators driven by the engine.
//!
//! The renderer owns pixels, viewports and the drawing tool's annotation
//! sets; the resampler is the numeric backend used when the two images have
//! different pixel spacing; the registration service aligns the two images
//! remotely. The engine only ever talks to them through these traits.

use async_trait::async_trait;

use crate::error::{RegistrationError, ResampleError};
use crate::geometry::{BBox, Offset};
use crate::roi::{Annotation, ImageId, RoiId};
use crate::viewport::Side;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Display transform of one viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewportTransform {
    /// Display pixels per image pixel.
    pub scale: f64,
    /// Translation in image pixel units.
    pub translation: Offset,
    /// Rotation in degrees.
    pub rotation: f64,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translation: Offset::default(),
            rotation: 0.0,
        }
    }
}

/// Pixel grid of the image currently displayed on a side.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageGeometry {
    pub columns: usize,
    pub rows: usize,
    /// Physical width of one pixel.
    pub column_pixel_spacing: f64,
    /// Physical height of one pixel.
    pub row_pixel_spacing: f64,
}

impl ImageGeometry {
    /// Image centre in pixel coordinates.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center(&self) -> Offset {
        Offset::new(self.columns as f64 / 2.0, self.rows as f64 / 2.0)
    }

    /// Number of pixels in one slice.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.columns * self.rows
    }

    /// Box covering the whole image.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn full_bbox(&self) -> BBox {
        BBox::from_edges(0, 0, self.columns as i32, self.rows as i32)
    }
}

/// Colormap applied to a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Colormap {
    #[default]
    Gray,
    HotIron,
    Jet,
    Hsv,
}

/// Visual style of one side's image layer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerStyle {
    pub opacity: f64,
    pub colormap: Colormap,
    pub visible: bool,
}

/// 8-bit difference raster, zero outside any ROI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OverlayRaster {
    pub width: usize,
    pub height: usize,
    /// Row-major pixels, `width * height` long.
    pub data: Vec<u8>,
}

impl OverlayRaster {
    /// A zeroed raster.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Number of non-zero pixels.
    #[must_use]
    pub fn lit_pixels(&self) -> usize {
        self.data.iter().filter(|v| **v != 0).count()
    }
}

/// Width and height of a pixel window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: usize,
    pub height: usize,
}

impl WindowSize {
    /// Creates a window size.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Size of a bounding box window; negative spans count as zero.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn of(bbox: &BBox) -> Self {
        Self {
            width: bbox.width.max(0) as usize,
            height: bbox.height.max(0) as usize,
        }
    }

    /// Number of pixels in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// True when the window has a zero dimension.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rendering and annotation collaborator.
///
/// Queries return `None` while a side is not enabled yet; callers treat that
/// as indeterminate rather than as an error.
pub trait Renderer {
    /// Current display transform.
    fn viewport_transform(&self, side: Side) -> Option<ViewportTransform>;

    /// Replaces the display transform.
    fn set_viewport_transform(&mut self, side: Side, transform: ViewportTransform);

    /// Pixel grid of the displayed image.
    fn image_geometry(&self, side: Side) -> Option<ImageGeometry>;

    /// Index of the slice currently displayed.
    fn current_slice_index(&self, side: Side) -> Option<usize>;

    /// Number of slices in the loaded stack.
    fn stack_size(&self, side: Side) -> Option<usize>;

    /// Starts loading another slice; completion is asynchronous.
    fn request_slice_index(&mut self, side: Side, index: usize);

    /// Annotation set of the displayed slice.
    fn annotations(&self, side: Side) -> Vec<Annotation>;

    /// Adds an annotation to the displayed slice.
    fn add_annotation(&mut self, side: Side, annotation: Annotation);

    /// Removes an annotation, returning whether it existed.
    fn remove_annotation(&mut self, side: Side, uuid: &RoiId) -> bool;

    /// Removes every annotation of the drawing tool on a side.
    fn clear_annotations(&mut self, side: Side);

    /// Shows or hides one annotation.
    fn set_annotation_visible(&mut self, side: Side, uuid: &RoiId, visible: bool);

    /// Row-major pixel values over `bbox`; pixels outside the image read as 0.
    fn sample_pixels(&self, side: Side, bbox: &BBox) -> Vec<f64>;

    /// Identity of the displayed image.
    fn image_identity(&self, side: Side) -> Option<ImageId>;

    /// Copies the drawing tool's in-progress cursor handle from one side to
    /// the other.
    fn sync_cursor_handles(&mut self, from: Side, to: Side);

    /// Requests a repaint.
    fn redraw(&mut self, side: Side);

    /// Hands a difference overlay to the renderer.
    fn set_overlay(&mut self, side: Side, overlay: OverlayRaster);

    /// Applies a layer style.
    fn set_layer_style(&mut self, side: Side, style: &LayerStyle);

    /// Swaps the image shown at one slice of a side's stack.
    fn replace_slice_image(&mut self, side: Side, index: usize, image: ImageId);
}

/// Numeric backend for resampling pixel windows.
pub trait Resampler {
    /// Resamples a row-major window of size `from` to size `to`.
    ///
    /// # Errors
    ///
    /// Returns an error when `pixels` does not match `from` or a window is
    /// empty.
    fn resample(
        &self,
        pixels: &[f64],
        from: WindowSize,
        to: WindowSize,
    ) -> Result<Vec<f64>, ResampleError>;
}

/// Full-resolution pixels of one side, sent to the registration service.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<f64>,
}

/// One registration request.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRequest {
    /// Service-specific method selector.
    pub method: String,
    pub left: ImageFrame,
    pub right: ImageFrame,
}

/// Rigid transform returned by the registration service.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransformParams {
    pub scale: f64,
    /// Rotation in radians.
    pub angle: f64,
    pub deltax: f64,
    pub deltay: f64,
    pub centerx: f64,
    pub centery: f64,
}

/// Registration service answer.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationResponse {
    /// A resampled right image replacing the current right slice.
    Image(ImageId),
    /// Alignment parameters for the right viewport.
    Transform(TransformParams),
}

/// Remote image-registration service.
#[async_trait(?Send)]
pub trait RegistrationService {
    /// Registers the right image onto the left one.
    async fn request_registration(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationResponse, RegistrationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_center_and_box() {
        let geometry = ImageGeometry {
            columns: 64,
            rows: 32,
            column_pixel_spacing: 0.5,
            row_pixel_spacing: 0.5,
        };
        assert_eq!(geometry.center(), Offset::new(32.0, 16.0));
        assert_eq!(geometry.full_bbox(), BBox::from_edges(0, 0, 64, 32));
        assert_eq!(geometry.pixel_count(), 2048);
    }

    #[test]
    fn test_window_size_of_bbox() {
        let size = WindowSize::of(&BBox::from_edges(3, 4, 13, 9));
        assert_eq!(size, WindowSize::new(10, 5));
        assert_eq!(size.len(), 50);
        assert!(WindowSize::of(&BBox::default()).is_empty());
    }
}
