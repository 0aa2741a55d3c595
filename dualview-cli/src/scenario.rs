//! JSON scenario files replayed against the in-memory renderer.

use std::path::Path;

use async_trait::async_trait;
use dualview_core::{
    Annotation, EngineConfig, Nudge, Offset, RegionScope, RegistrationError, RegistrationRequest,
    RegistrationResponse, RegistrationService, Renderer, RoiId, Side, TransformParams,
};
use dualview_sync::{ComparisonEngine, MemoryRenderer, SliceScroll, Volume, VolumeStats};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{CliError, Result};

/// Pixel content of a synthetic volume.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Pattern {
    /// Every pixel has the same value.
    Fill { value: f64 },
    /// `offset + x * dx + y * dy + z * dz`.
    Gradient {
        #[serde(default)]
        offset: f64,
        #[serde(default)]
        dx: f64,
        #[serde(default)]
        dy: f64,
        #[serde(default)]
        dz: f64,
    },
}

/// One side's image stack.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeSpec {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    #[serde(default = "unit_spacing")]
    pub spacing: f64,
    pub pattern: Pattern,
}

fn unit_spacing() -> f64 {
    1.0
}

impl VolumeSpec {
    #[allow(clippy::cast_precision_loss)]
    fn build(&self) -> Volume {
        match self.pattern {
            Pattern::Fill { value } => {
                Volume::filled(self.width, self.height, self.depth, self.spacing, value)
            }
            Pattern::Gradient { offset, dx, dy, dz } => Volume::from_fn(
                self.width,
                self.height,
                self.depth,
                self.spacing,
                move |x, y, z| offset + x as f64 * dx + y as f64 * dy + z as f64 * dz,
            ),
        }
    }
}

/// A user action.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    /// Draw a polygon on the slice a side is showing.
    Draw {
        side: Side,
        #[serde(default)]
        id: Option<String>,
        points: Vec<Offset>,
        #[serde(default)]
        closable: bool,
    },
    /// Move the vertices of an existing polygon.
    Edit {
        side: Side,
        id: String,
        points: Vec<Offset>,
    },
    /// Scroll a side to a slice.
    Scroll { side: Side, to: usize },
    /// Pan and zoom a side.
    Pan {
        side: Side,
        scale: f64,
        x: f64,
        y: f64,
    },
    /// Manual alignment step.
    Nudge {
        side: Side,
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default)]
        angle: Option<f64>,
    },
    /// Clear ROIs.
    Clear { side: Side, scope: RegionScope },
    /// Recalibrate the slice offset from the slices shown.
    ResetStack,
    /// Toggle synchronization.
    Sync {
        #[serde(default)]
        roi: Option<bool>,
        #[serde(default)]
        stack: Option<bool>,
    },
    /// Register with a fixed transform answer.
    Register { transform: TransformParams },
}

/// A complete comparison session.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub left: VolumeSpec,
    pub right: VolumeSpec,
    #[serde(default)]
    pub config: EngineConfig,
    /// Extra index reads before a requested slice is reported.
    #[serde(default)]
    pub load_latency: u32,
    #[serde(default)]
    pub region: RegionScope,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Reads and parses a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Renderer showing both volumes.
    pub fn renderer(&self) -> MemoryRenderer {
        MemoryRenderer::new(self.left.build(), self.right.build())
            .with_load_latency(self.load_latency)
    }
}

/// Registration service that always answers with the same transform.
struct FixedTransform(TransformParams);

#[async_trait(?Send)]
impl RegistrationService for FixedTransform {
    async fn request_registration(
        &self,
        request: RegistrationRequest,
    ) -> std::result::Result<RegistrationResponse, RegistrationError> {
        debug!(
            "answering registration ({} x {} vs {} x {})",
            request.left.width, request.left.height, request.right.width, request.right.height
        );
        Ok(RegistrationResponse::Transform(self.0))
    }
}

/// Final state of one side.
#[derive(Debug, Clone, Serialize)]
pub struct SideReport {
    pub side: Side,
    pub slice: Option<usize>,
    pub depth: Option<usize>,
    pub records: usize,
    pub annotations: usize,
    pub dx: f64,
    pub dy: f64,
    pub angle: f64,
}

/// What a replay ends with.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub steps: usize,
    pub delta_stack_index: i64,
    pub left: SideReport,
    pub right: SideReport,
    pub stats: Option<VolumeStats>,
}

fn side_report(engine: &ComparisonEngine<MemoryRenderer>, side: Side) -> SideReport {
    let state = engine.viewport(side);
    SideReport {
        side,
        slice: state.stack_position,
        depth: state.stack_size,
        records: state.record_count(),
        annotations: engine.backend().annotations(side).len(),
        dx: state.dx,
        dy: state.dy,
        angle: state.angle,
    }
}

/// Replays `scenario` and reports statistics over `region`.
pub async fn replay(scenario: &Scenario, region: RegionScope) -> Result<Report> {
    let mut engine = ComparisonEngine::new(scenario.renderer(), scenario.config.clone())?;
    for side in Side::BOTH {
        engine.on_image_loaded(side);
    }

    for (n, step) in scenario.steps.iter().enumerate() {
        debug!("step {}: {step:?}", n + 1);
        apply(&mut engine, step).await?;
        engine.run_deferred();
    }
    engine.select_histogram_region(region);
    info!("replayed {} step(s)", scenario.steps.len());

    Ok(Report {
        steps: scenario.steps.len(),
        delta_stack_index: engine.config().sync.delta_stack_index,
        left: side_report(&engine, Side::Left),
        right: side_report(&engine, Side::Right),
        stats: engine.stats().cloned(),
    })
}

async fn apply(engine: &mut ComparisonEngine<MemoryRenderer>, step: &Step) -> Result<()> {
    match step {
        Step::Draw {
            side,
            id,
            points,
            closable,
        } => {
            let uuid = id.as_deref().map_or_else(RoiId::generate, RoiId::new);
            let annotation = Annotation::new(uuid, points.clone()).with_closable(*closable);
            engine.backend_mut().draw(*side, annotation);
            engine.on_roi_edited(*side)?;
        }
        Step::Edit { side, id, points } => {
            if !engine
                .backend_mut()
                .edit_points(*side, &RoiId::new(id.as_str()), points.clone())
            {
                return Err(CliError::Scenario(format!("no ROI {id} on the {side} slice")));
            }
            engine.on_roi_edited(*side)?;
        }
        Step::Scroll { side, to } => {
            let from = engine.viewport(*side).stack_position.unwrap_or(0);
            let step = i64::try_from(*to).unwrap_or(i64::MAX)
                - i64::try_from(from).unwrap_or(i64::MAX);
            engine.backend_mut().scroll_to(*side, *to);
            if let Some(poll) = engine.on_slice_scroll(*side, SliceScroll::new(step)).await {
                debug!("{side} scroll: {poll:?}");
            }
        }
        Step::Pan { side, scale, x, y } => {
            let Some(mut transform) = engine.backend().viewport_transform(*side) else {
                return Err(CliError::Scenario(format!("{side} viewport is disabled")));
            };
            transform.scale = *scale;
            transform.translation = Offset::new(*x, *y);
            engine.backend_mut().set_viewport_transform(*side, transform);
            engine.on_viewport_changed(*side);
        }
        Step::Nudge { side, x, y, angle } => {
            engine.translate_or_rotate(
                *side,
                Nudge {
                    x: *x,
                    y: *y,
                    angle: *angle,
                },
            );
        }
        Step::Clear { side, scope } => {
            engine.clear_tool(*side, *scope);
        }
        Step::ResetStack => {
            engine.reset_stack_position();
        }
        Step::Sync { roi, stack } => {
            if let Some(roi) = roi {
                engine.set_synchronize_roi(*roi);
            }
            if let Some(stack) = stack {
                engine.set_synchronize_stack(*stack);
            }
        }
        Step::Register { transform } => {
            engine.register_images(&FixedTransform(*transform)).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "left": { "width": 16, "height": 16, "depth": 3,
                  "pattern": { "kind": "fill", "value": 5.0 } },
        "right": { "width": 16, "height": 16, "depth": 3,
                   "pattern": { "kind": "gradient", "dx": 1.0 } },
        "region": "volume",
        "steps": [
            { "action": "draw", "side": "left", "id": "a",
              "points": [ {"x": 2, "y": 2}, {"x": 6, "y": 2}, {"x": 6, "y": 4}, {"x": 2, "y": 4} ] },
            { "action": "scroll", "side": "left", "to": 2 },
            { "action": "reset-stack" }
        ]
    }"#;

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.region, RegionScope::Volume);
        assert_eq!(scenario.steps.len(), 3);
        assert!((scenario.left.spacing - 1.0).abs() < f64::EPSILON);
        assert_eq!(scenario.config, EngineConfig::default());
        assert!(matches!(scenario.steps[2], Step::ResetStack));
    }

    #[tokio::test]
    async fn test_replay_reports_both_sides() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let report = replay(&scenario, scenario.region).await.unwrap();

        assert_eq!(report.steps, 3);
        assert_eq!(report.left.slice, Some(2));
        assert_eq!(report.right.slice, Some(2));
        assert_eq!(report.delta_stack_index, 0);
        assert_eq!(report.left.records, 1);
        assert_eq!(report.right.records, 1);
        // The ROI stays behind on slice 0.
        assert_eq!(report.left.annotations, 0);

        let stats = report.stats.unwrap();
        // 4 x 2 pixels at the same positions on both sides.
        assert_eq!(stats.count, 8);
        assert!((stats.diff.min - 0.0).abs() < 1e-12);
        assert!((stats.diff.max - 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_edit_of_unknown_roi_fails() {
        let mut scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        scenario.steps = vec![Step::Edit {
            side: Side::Right,
            id: "missing".into(),
            points: Vec::new(),
        }];
        let err = replay(&scenario, RegionScope::Volume).await.unwrap_err();
        assert!(matches!(err, CliError::Scenario(_)));
    }
}
