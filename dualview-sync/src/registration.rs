//! Applying image-registration results to the right side.

use dualview_core::{
    Error, ImageFrame, Nudge, RegistrationRequest, RegistrationResponse, RegistrationService,
    Renderer, Result, Side, TransformParams, ViewportState,
};
use log::{debug, warn};

/// Transforms at or above this scale are expressed relative to the rotation
/// centre reported by the service.
const CENTRED_SCALE_THRESHOLD: f64 = 1.5;

/// What a successful registration changed.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationApplied {
    /// The right side's slice `index` now shows a registered image.
    ImageReplaced { index: usize },
    /// The right viewport was re-aligned with this nudge.
    Aligned(Nudge),
}

/// Nudge that moves the right viewport onto a service transform.
///
/// The nudge first cancels the viewport's current manual offset, so after it
/// is applied `dx`/`dy` equal the negated service translation, or
/// `centre - translation` at and above the centred scale.
#[must_use]
pub fn alignment_nudge(params: &TransformParams, right: &ViewportState) -> Nudge {
    let (x, y) = if params.scale < CENTRED_SCALE_THRESHOLD {
        (-right.dx - params.deltax, -right.dy - params.deltay)
    } else {
        (
            -right.dx + (params.centerx - params.deltax),
            -right.dy + (params.centery - params.deltay),
        )
    };
    Nudge {
        x: Some(x),
        y: Some(y),
        angle: Some(-params.angle.to_degrees()),
    }
}

/// Drives one registration round-trip at a time.
#[derive(Debug, Clone, Default)]
pub struct ImageRegistration {
    method: String,
    loading: bool,
}

impl ImageRegistration {
    /// Creates a driver using `method` as the service's method selector.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            loading: false,
        }
    }

    /// Method selector sent with each request.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Changes the method selector.
    pub fn select_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    /// True while a request is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Registers the right image onto the left one and applies the answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] when a side has no image and
    /// [`Error::Registration`] when the service fails; in both cases nothing
    /// is changed and no retry is attempted.
    pub async fn run<R, S>(
        &mut self,
        renderer: &mut R,
        right: &mut ViewportState,
        service: &S,
    ) -> Result<RegistrationApplied>
    where
        R: Renderer + ?Sized,
        S: RegistrationService + ?Sized,
    {
        let index = renderer
            .current_slice_index(Side::Right)
            .ok_or(Error::NotReady(Side::Right))?;
        let request = RegistrationRequest {
            method: self.method.clone(),
            left: frame(renderer, Side::Left)?,
            right: frame(renderer, Side::Right)?,
        };

        self.loading = true;
        debug!("requesting registration with method {}", request.method);
        let response = service.request_registration(request).await;
        self.loading = false;

        match response {
            Ok(RegistrationResponse::Image(image)) => {
                debug!("registered image {image} replaces right slice {index}");
                renderer.replace_slice_image(Side::Right, index, image);
                renderer.redraw(Side::Right);
                right.refresh_from(renderer);
                Ok(RegistrationApplied::ImageReplaced { index })
            }
            Ok(RegistrationResponse::Transform(params)) => {
                let nudge = alignment_nudge(&params, right);
                debug!("registration transform {params:?} applied as {nudge:?}");
                right.translate_or_rotate(renderer, nudge);
                Ok(RegistrationApplied::Aligned(nudge))
            }
            Err(e) => {
                warn!("registration failed: {e}");
                Err(e.into())
            }
        }
    }
}

/// Full-resolution pixels of a side's displayed slice.
fn frame<R: Renderer + ?Sized>(renderer: &R, side: Side) -> Result<ImageFrame> {
    let geometry = renderer.image_geometry(side).ok_or(Error::NotReady(side))?;
    Ok(ImageFrame {
        width: geometry.columns,
        height: geometry.rows,
        pixels: renderer.sample_pixels(side, &geometry.full_bbox()),
    })
}
