//! dualview-sync: Synchronization and difference engine for two viewports.
//!
//! This crate provides:
//! - **Pan/zoom** and **slice** lockstep between the two sides
//! - **ROI reconciliation** that mirrors polygons without feedback loops
//! - **Difference overlays** with cache-validated per-pixel data
//! - **Region statistics** over the last ROI, the current slice or the volume
//!
//! [`ComparisonEngine`] ties them together behind the UI events.
//!

pub mod diff;
pub mod engine;
pub mod memory;
pub mod pan_zoom;
pub mod reconcile;
pub mod registration;
pub mod resample;
pub mod stack_index;
pub mod stats;

pub use diff::{DiffComputer, DiffOutcome};
pub use engine::ComparisonEngine;
pub use memory::{MemoryRenderer, Volume};
pub use pan_zoom::{follow_transform, PanZoomSynchronizer};
pub use reconcile::{Completion, ReconcileOutcome, RoiReconciler};
pub use registration::{alignment_nudge, ImageRegistration, RegistrationApplied};
pub use resample::BilinearResampler;
pub use stack_index::{target_index, SliceScroll, StackIndexSynchronizer, StackPoll};
pub use stats::{
    measure_region, merge_points, ChannelStats, SideStats, StatsAggregator, VolumeStats,
};

// Re-export core types used throughout the public API
pub use dualview_core::{EngineConfig, RegionScope, Side, SyncConfig};
