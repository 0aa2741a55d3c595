//! dualview-core: Core types and collaborator traits for dual-viewport image
//! comparison.
//!
//! This crate provides polygon geometry, per-side viewport state with its
//! ROI-by-slice store, the cross-side coordinate mapping, configuration and
//! the traits through which the engine drives the renderer, the resample
//! backend and the registration service.
//!

pub mod backend;
pub mod config;
pub mod error;
pub mod geometry;
pub mod mapping;
pub mod roi;
pub mod viewport;

pub use backend::{
    Colormap, ImageFrame, ImageGeometry, LayerStyle, OverlayRaster, RegistrationRequest,
    RegistrationResponse, RegistrationService, Renderer, Resampler, TransformParams,
    ViewportTransform, WindowSize,
};
pub use config::{EngineConfig, StackPollPolicy, SyncConfig};
pub use error::{Error, RegistrationError, ResampleError, Result};
pub use geometry::{
    bounding_box, point_in_polygon, points_equal, polygon_area, rescale_bounding_box, BBox, Offset,
};
pub use mapping::CoordinateMapping;
pub use roi::{
    Annotation, DiffData, DiffPoint, ImageId, LastEdit, RegionScope, RoiId, RoiRecord, RoiStats,
};
pub use viewport::{Nudge, Side, ViewportState};
