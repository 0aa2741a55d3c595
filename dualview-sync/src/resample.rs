//! Bilinear resampling of pixel windows.
//!
//! Destination pixel `(row, col)` samples the source at
//! `(row * in_h / out_h, col * in_w / out_w)` (corners not aligned, no
//! half-pixel shift) with clamp-to-edge at the far border.

use dualview_core::{ResampleError, Resampler, WindowSize};
use ndarray::{Array2, ArrayView2};

/// Default [`Resampler`] backed by `ndarray`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BilinearResampler;

impl BilinearResampler {
    /// Creates the resampler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Resampler for BilinearResampler {
    #[allow(clippy::cast_precision_loss)]
    fn resample(
        &self,
        pixels: &[f64],
        from: WindowSize,
        to: WindowSize,
    ) -> Result<Vec<f64>, ResampleError> {
        if from.is_empty() || to.is_empty() {
            return Err(ResampleError::EmptyWindow);
        }
        let src = ArrayView2::from_shape((from.height, from.width), pixels).map_err(|_| {
            ResampleError::SizeMismatch {
                expected: from.len(),
                actual: pixels.len(),
            }
        })?;
        if from == to {
            return Ok(pixels.to_vec());
        }

        let scale_y = from.height as f64 / to.height as f64;
        let scale_x = from.width as f64 / to.width as f64;
        let out = Array2::from_shape_fn((to.height, to.width), |(row, col)| {
            sample_bilinear(&src, col as f64 * scale_x, row as f64 * scale_y)
        });
        Ok(out.into_iter().collect())
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample_bilinear(src: &ArrayView2<'_, f64>, x: f64, y: f64) -> f64 {
    let (height, width) = src.dim();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let clamp = |v: f64, len: usize| (v.max(0.0) as usize).min(len - 1);
    let (c0, c1) = (clamp(x0, width), clamp(x0 + 1.0, width));
    let (r0, r1) = (clamp(y0, height), clamp(y0 + 1.0, height));

    let top = src[[r0, c0]] * (1.0 - fx) + src[[r0, c1]] * fx;
    let bottom = src[[r1, c0]] * (1.0 - fx) + src[[r1, c1]] * fx;
    top * (1.0 - fy) + bottom * fy
}
