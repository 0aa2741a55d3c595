//! The UI-facing comparison engine.
//!
//! [`ComparisonEngine`] owns both [`ViewportState`]s and the collaborators,
//! and turns UI events into calls on the synchronizers, the reconciler and
//! the diff computer. Statistics are not computed inline: every change that
//! affects them only marks them pending, and [`ComparisonEngine::run_deferred`]
//! recomputes them.

use dualview_core::{
    points_equal, Annotation, Colormap, CoordinateMapping, EngineConfig, LastEdit, Nudge,
    RegionScope, RegistrationService, Renderer, Resampler, Result, Side, ViewportState,
};
use log::{debug, warn};

use crate::diff::DiffComputer;
use crate::pan_zoom::PanZoomSynchronizer;
use crate::reconcile::{ReconcileOutcome, RoiReconciler};
use crate::registration::{ImageRegistration, RegistrationApplied};
use crate::resample::BilinearResampler;
use crate::stack_index::{SliceScroll, StackIndexSynchronizer, StackPoll};
use crate::stats::{StatsAggregator, VolumeStats};

/// Synchronization and difference engine for two viewports.
pub struct ComparisonEngine<R: Renderer, S: Resampler = BilinearResampler> {
    backend: R,
    resampler: S,
    config: EngineConfig,
    left: ViewportState,
    right: ViewportState,
    last_edit: Option<LastEdit>,
    histogram_region: RegionScope,
    stats: Option<VolumeStats>,
    stats_pending: bool,
    registration: ImageRegistration,
    stack_sync: StackIndexSynchronizer,
    pan_zoom: PanZoomSynchronizer,
}

impl<R: Renderer> ComparisonEngine<R> {
    /// Creates an engine with the default bilinear resampler.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` fails validation.
    pub fn new(backend: R, config: EngineConfig) -> Result<Self> {
        Self::with_resampler(backend, BilinearResampler::new(), config)
    }
}

impl<R: Renderer, S: Resampler> ComparisonEngine<R, S> {
    /// Creates an engine with a custom resample backend.
    ///
    /// Both viewports are refreshed from the renderer right away, so sides
    /// that already show an image start out loaded.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` fails validation.
    pub fn with_resampler(backend: R, resampler: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut left = ViewportState::new(Side::Left);
        let mut right = ViewportState::new(Side::Right);
        left.refresh_from(&backend);
        right.refresh_from(&backend);
        Ok(Self {
            registration: ImageRegistration::new(config.registration_method.clone()),
            stack_sync: StackIndexSynchronizer::new(config.stack_poll),
            pan_zoom: PanZoomSynchronizer,
            backend,
            resampler,
            config,
            left,
            right,
            last_edit: None,
            histogram_region: RegionScope::default(),
            stats: None,
            stats_pending: false,
        })
    }

    /// The renderer.
    pub fn backend(&self) -> &R {
        &self.backend
    }

    /// Mutable access to the renderer, for driving it from outside.
    pub fn backend_mut(&mut self) -> &mut R {
        &mut self.backend
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// State of one side.
    pub fn viewport(&self, side: Side) -> &ViewportState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn viewport_mut(&mut self, side: Side) -> &mut ViewportState {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Most recently edited ROI.
    pub fn last_edit(&self) -> Option<&LastEdit> {
        self.last_edit.as_ref()
    }

    /// Region used for statistics.
    pub fn histogram_region(&self) -> RegionScope {
        self.histogram_region
    }

    /// Statistics from the last deferred pass.
    pub fn stats(&self) -> Option<&VolumeStats> {
        self.stats.as_ref()
    }

    /// True when statistics are out of date.
    pub fn has_pending_stats(&self) -> bool {
        self.stats_pending
    }

    /// True while a registration request is in flight.
    pub fn is_registering(&self) -> bool {
        self.registration.is_loading()
    }

    /// Turns ROI mirroring on or off.
    pub fn set_synchronize_roi(&mut self, enabled: bool) {
        self.config.sync.synchronize_roi = enabled;
    }

    /// Turns slice lockstep on or off.
    pub fn set_synchronize_stack(&mut self, enabled: bool) {
        self.config.sync.synchronize_stack = enabled;
    }

    /// Changes the registration method selector.
    pub fn select_registration_method(&mut self, method: impl Into<String>) {
        let method = method.into();
        self.registration.select_method(method.clone());
        self.config.registration_method = method;
    }

    /// A side finished loading a new image stack.
    pub fn on_image_loaded(&mut self, side: Side) {
        let state = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        state.refresh_from(&self.backend);
        self.backend.set_layer_style(side, &state.layer_style());
        debug!(
            "{side} loaded: slice {:?} of {:?}",
            state.stack_position, state.stack_size
        );
    }

    /// The drawing tool changed an annotation on `side`.
    ///
    /// Runs one reconciliation pass, records every completed annotation on
    /// the slice its side is showing, and refreshes both overlays when
    /// anything was recorded.
    ///
    /// # Errors
    ///
    /// Returns an error when a mirrored copy is needed but the sides cannot
    /// be mapped onto each other.
    pub fn on_roi_edited(&mut self, side: Side) -> Result<ReconcileOutcome> {
        self.left.refresh_from(&self.backend);
        self.right.refresh_from(&self.backend);

        let outcome = self.reconcile_from(side)?;
        if !outcome.completed.is_empty() {
            self.refresh_overlays();
        }
        Ok(outcome)
    }

    /// `side` scrolled by `scroll.step` slices.
    ///
    /// With stack sync on, the other side is moved to the matching slice and
    /// the load is awaited within the poll budget. Only then are the ROIs of
    /// the newly shown slices reconciled, driven by `side`, and both sides
    /// redrawn. Returns the poll outcome when the other side was asked to
    /// move.
    pub async fn on_slice_scroll(
        &mut self,
        side: Side,
        scroll: SliceScroll,
    ) -> Option<StackPoll> {
        let poll = if self.config.sync.synchronize_stack {
            let stack_sync = self.stack_sync;
            let delta = self.config.sync.delta_stack_index;
            stack_sync.drive(&mut self.backend, side, scroll, delta).await
        } else {
            None
        };
        self.left.refresh_from(&self.backend);
        self.right.refresh_from(&self.backend);

        if let Err(e) = self.reconcile_from(side) {
            warn!("{side}: ROIs not reconciled after scroll: {e}");
        }
        for s in Side::BOTH {
            self.backend.redraw(s);
        }
        self.refresh_overlays();
        poll
    }

    /// One reconciliation pass driven by `side`, recording its completions.
    ///
    /// An annotation counts as changed unless it matches its record or is an
    /// exact mirror of a correlated annotation on the other side, so echoed
    /// edit events leave unrecorded ROIs in place.
    fn reconcile_from(&mut self, side: Side) -> Result<ReconcileOutcome> {
        let reconciler = RoiReconciler::new(&self.config.sync, self.config.roi_area_epsilon);
        let (driving, passive) = match side {
            Side::Left => (&self.left, &self.right),
            Side::Right => (&self.right, &self.left),
        };
        let counterparts = self.backend.annotations(passive.side());
        let to_passive = CoordinateMapping::between(&self.backend, driving, passive).ok();
        let to_driving = CoordinateMapping::between(&self.backend, passive, driving).ok();
        let slice = driving.stack_position;

        let outcome = reconciler.reconcile(&mut self.backend, driving, passive, |a| {
            let recorded = slice
                .and_then(|s| driving.record(s, &a.uuid))
                .is_some_and(|r| points_equal(&r.points, &a.points));
            !recorded
                && !is_mirrored(a, &counterparts, to_passive.as_ref(), to_driving.as_ref())
        })?;

        for completion in &outcome.completed {
            let state = self.viewport_mut(completion.side);
            if let Some(slice) = state.stack_position {
                state.set_points(slice, &completion.annotation);
            }
        }
        if let Some(edit) = &outcome.last_edit {
            self.last_edit = Some(edit.clone());
        }
        Ok(outcome)
    }

    /// `side`'s viewport was panned or zoomed; the other side follows.
    pub fn on_viewport_changed(&mut self, side: Side) -> bool {
        let (source, target) = match side {
            Side::Left => (&self.left, &self.right),
            Side::Right => (&self.right, &self.left),
        };
        self.pan_zoom.synchronize(&mut self.backend, source, target)
    }

    /// Sets a side's overlay opacity.
    pub fn set_opacity(&mut self, side: Side, opacity: f64) {
        self.viewport_mut(side).opacity = opacity.clamp(0.0, 1.0);
        self.apply_layer_style(side);
    }

    /// Sets a side's colormap.
    pub fn set_colormap(&mut self, side: Side, colormap: Colormap) {
        self.viewport_mut(side).colormap = colormap;
        self.apply_layer_style(side);
    }

    /// Shows or hides a side's layer.
    pub fn set_visibility(&mut self, side: Side, visible: bool) {
        self.viewport_mut(side).visible = visible;
        self.apply_layer_style(side);
    }

    fn apply_layer_style(&mut self, side: Side) {
        let style = self.viewport(side).layer_style();
        self.backend.set_layer_style(side, &style);
        self.backend.redraw(side);
    }

    /// Clears ROIs in `scope` on `side`, and on the other side too while ROI
    /// sync is on. Returns whether anything was removed.
    ///
    /// The renderer's annotations in scope go as well, recorded or not.
    pub fn clear_tool(&mut self, side: Side, scope: RegionScope) -> bool {
        self.left.refresh_from(&self.backend);
        self.right.refresh_from(&self.backend);
        let sides = if self.config.sync.synchronize_roi {
            vec![side, side.other()]
        } else {
            vec![side]
        };
        let last = self.last_edit.as_ref().map(|e| e.correlation.clone());

        let mut any = false;
        for s in sides {
            let state = match s {
                Side::Left => &mut self.left,
                Side::Right => &mut self.right,
            };
            let stored = state.remove_data(scope, state.stack_position, last.as_ref());
            let shown = match scope {
                RegionScope::Volume => {
                    let had = !self.backend.annotations(s).is_empty();
                    self.backend.clear_annotations(s);
                    had
                }
                RegionScope::Slice => {
                    let mut removed = false;
                    for a in self.backend.annotations(s) {
                        removed |= self.backend.remove_annotation(s, &a.uuid);
                    }
                    removed
                }
                RegionScope::LastRoi => {
                    let mut removed = false;
                    for a in self.backend.annotations(s) {
                        if Some(&a.correlation) == last.as_ref() {
                            removed |= self.backend.remove_annotation(s, &a.uuid);
                        }
                    }
                    removed
                }
            };
            if stored || shown {
                self.backend.redraw(s);
                any = true;
            }
        }

        if any {
            debug!("cleared {scope:?} starting from {side}");
            self.refresh_overlays();
        }
        any
    }

    /// Recalibrates the slice offset from the slices currently shown.
    pub fn reset_stack_position(&mut self) -> Option<i64> {
        let delta = StackIndexSynchronizer::calibrate(&self.backend)?;
        self.config.sync.delta_stack_index = delta;
        debug!("stack offset calibrated to {delta}");
        Some(delta)
    }

    /// Changes the statistics region and recomputes the statistics.
    pub fn select_histogram_region(&mut self, scope: RegionScope) -> Option<&VolumeStats> {
        self.histogram_region = scope;
        self.update_stats();
        self.stats.as_ref()
    }

    /// Applies a manual alignment step to one side.
    pub fn translate_or_rotate(&mut self, side: Side, nudge: Nudge) {
        let state = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        state.translate_or_rotate(&mut self.backend, nudge);
    }

    /// Registers the right image onto the left one and applies the result.
    ///
    /// # Errors
    ///
    /// Returns the registration error; the engine state is left untouched.
    pub async fn register_images<T>(&mut self, service: &T) -> Result<RegistrationApplied>
    where
        T: RegistrationService + ?Sized,
    {
        let applied = self
            .registration
            .run(&mut self.backend, &mut self.right, service)
            .await?;
        if matches!(applied, RegistrationApplied::ImageReplaced { .. }) {
            self.refresh_overlays();
        }
        Ok(applied)
    }

    /// Runs deferred work. Returns whether anything ran.
    pub fn run_deferred(&mut self) -> bool {
        if !self.stats_pending {
            return false;
        }
        self.update_stats();
        true
    }

    fn update_stats(&mut self) {
        self.stats = StatsAggregator.aggregate(
            &self.left,
            &self.right,
            self.histogram_region,
            self.last_edit.as_ref(),
        );
        self.stats_pending = false;
        match &self.stats {
            Some(s) => debug!(
                "{:?} stats: {} point(s), mean diff {:.3}",
                s.scope, s.count, s.diff.mean
            ),
            None => debug!("{:?} stats: no data", self.histogram_region),
        }
    }

    /// Recomputes both sides' difference data and hands the overlays over.
    fn refresh_overlays(&mut self) {
        let computer = DiffComputer::new(&self.resampler);
        for side in Side::BOTH {
            let (this, other) = pair_mut(&mut self.left, &mut self.right, side);
            match computer.compute(&self.backend, this, other) {
                Ok(outcome) => {
                    if let Some(overlay) = outcome.overlay {
                        self.backend.set_overlay(side, overlay);
                        self.backend.redraw(side);
                    }
                }
                Err(e) => warn!("{side}: overlay not updated: {e}"),
            }
        }
        self.stats_pending = true;
    }
}

/// True when `a` and a correlated annotation in `others` are exact mirrors
/// of each other, whichever side the original is on.
fn is_mirrored(
    a: &Annotation,
    others: &[Annotation],
    to_other: Option<&CoordinateMapping>,
    from_other: Option<&CoordinateMapping>,
) -> bool {
    others
        .iter()
        .filter(|o| o.correlation == a.correlation)
        .any(|o| {
            to_other.is_some_and(|m| points_equal(&m.apply_all(&a.points), &o.points))
                || from_other.is_some_and(|m| points_equal(&m.apply_all(&o.points), &a.points))
        })
}

/// `(side, other side)` as disjoint mutable borrows.
fn pair_mut<'a>(
    left: &'a mut ViewportState,
    right: &'a mut ViewportState,
    side: Side,
) -> (&'a mut ViewportState, &'a mut ViewportState) {
    match side {
        Side::Left => (left, right),
        Side::Right => (right, left),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryRenderer, Volume};
    use dualview_core::{Annotation, Offset, RoiId};

    fn engine() -> ComparisonEngine<MemoryRenderer> {
        let renderer = MemoryRenderer::new(
            Volume::filled(32, 32, 4, 1.0, 9.0),
            Volume::from_fn(32, 32, 4, 1.0, |x, _, _| if x < 16 { 1.0 } else { 3.0 }),
        );
        ComparisonEngine::new(renderer, EngineConfig::default()).unwrap()
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Offset> {
        vec![
            Offset::new(x0, y0),
            Offset::new(x1, y0),
            Offset::new(x1, y1),
            Offset::new(x0, y1),
        ]
    }

    #[test]
    fn test_new_refreshes_both_sides() {
        let engine = engine();
        assert!(engine.viewport(Side::Left).loaded);
        assert_eq!(engine.viewport(Side::Right).stack_size, Some(4));
    }

    #[test]
    fn test_edit_records_both_sides_and_defers_stats() {
        let mut engine = engine();
        engine.backend_mut().draw(
            Side::Left,
            Annotation::new(RoiId::new("a"), square(12.0, 0.0, 20.0, 4.0)),
        );
        let outcome = engine.on_roi_edited(Side::Left).unwrap();
        assert_eq!(outcome.completed.len(), 2);
        assert_eq!(engine.viewport(Side::Left).record_count(), 1);
        assert_eq!(engine.viewport(Side::Right).record_count(), 1);
        assert!(engine.has_pending_stats());
        assert!(engine.stats().is_none());

        assert!(engine.run_deferred());
        assert!(!engine.run_deferred());
        let stats = engine.stats().unwrap();
        // Last-ROI scope, edited on the left: 8 x 4 pixels.
        assert_eq!(stats.count, 32);
        assert!((stats.diff.min - 6.0).abs() < 1e-12);
        assert!((stats.diff.max - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_edit_event_converges() {
        let mut engine = engine();
        engine.backend_mut().draw(
            Side::Left,
            Annotation::new(RoiId::new("a"), square(2.0, 2.0, 6.0, 6.0)),
        );
        engine.on_roi_edited(Side::Left).unwrap();
        // The renderer echoes the change on both sides; nothing moves again.
        let echo_right = engine.on_roi_edited(Side::Right).unwrap();
        let echo_left = engine.on_roi_edited(Side::Left).unwrap();
        assert!(!echo_right.mutated);
        assert!(!echo_left.mutated);
        assert_eq!(engine.backend().annotations(Side::Right).len(), 1);
    }

    #[test]
    fn test_roi_being_drawn_survives_echoed_edits() {
        let mut engine = engine();
        engine.backend_mut().draw(
            Side::Left,
            Annotation::new(RoiId::new("a"), square(2.0, 2.0, 6.0, 6.0)),
        );
        engine.on_roi_edited(Side::Left).unwrap();
        // A single vertex: below the area threshold and not closable.
        engine.backend_mut().draw(
            Side::Left,
            Annotation::new(RoiId::new("drawing"), vec![Offset::new(10.0, 10.0)]),
        );
        assert!(engine.on_roi_edited(Side::Left).unwrap().mutated);

        for _ in 0..3 {
            assert!(!engine.on_roi_edited(Side::Right).unwrap().mutated);
            assert!(!engine.on_roi_edited(Side::Left).unwrap().mutated);
        }
        let left = engine.backend().annotations(Side::Left);
        assert!(left.iter().any(|a| a.uuid == RoiId::new("drawing")));
        assert_eq!(left.len(), 2);
        assert_eq!(engine.backend().annotations(Side::Right).len(), 2);
        assert_eq!(engine.viewport(Side::Left).record_count(), 1);

        // A second vertex is a real change and is mirrored again.
        assert!(engine.backend_mut().edit_points(
            Side::Left,
            &RoiId::new("drawing"),
            vec![Offset::new(10.0, 10.0), Offset::new(12.0, 10.0)]
        ));
        assert!(engine.on_roi_edited(Side::Left).unwrap().mutated);
        let copy = engine
            .backend()
            .annotations(Side::Right)
            .into_iter()
            .find(|a| a.correlation == RoiId::new("drawing"))
            .unwrap();
        assert_eq!(copy.points.len(), 2);
    }

    #[test]
    fn test_copies_onto_hidden_side_follow_its_visibility() {
        let mut engine = engine();
        engine.set_visibility(Side::Right, false);

        engine.backend_mut().draw(
            Side::Left,
            Annotation::new(RoiId::new("a"), square(2.0, 2.0, 6.0, 6.0)),
        );
        engine.on_roi_edited(Side::Left).unwrap();
        let copies = engine.backend().annotations(Side::Right);
        assert_eq!(copies.len(), 1);
        assert!(!copies[0].visible);

        // Sub-threshold copies stay visible so they can be finished.
        engine.backend_mut().draw(
            Side::Left,
            Annotation::new(RoiId::new("dot"), vec![Offset::new(20.0, 20.0)]),
        );
        assert!(engine.on_roi_edited(Side::Left).unwrap().mutated);
        let dot = engine
            .backend()
            .annotations(Side::Right)
            .into_iter()
            .find(|a| a.correlation == RoiId::new("dot"))
            .unwrap();
        assert!(dot.visible);
    }

    #[test]
    fn test_clear_removes_unrecorded_annotations() {
        let mut engine = engine();
        engine.backend_mut().draw(
            Side::Left,
            Annotation::new(RoiId::new("dot"), vec![Offset::new(5.0, 5.0)]),
        );
        engine.on_roi_edited(Side::Left).unwrap();
        assert_eq!(engine.viewport(Side::Left).record_count(), 0);
        assert_eq!(engine.backend().annotations(Side::Right).len(), 1);

        assert!(engine.clear_tool(Side::Left, RegionScope::Slice));
        assert!(engine.backend().annotations(Side::Left).is_empty());
        assert!(engine.backend().annotations(Side::Right).is_empty());
        assert!(!engine.clear_tool(Side::Left, RegionScope::Slice));
    }

    #[test]
    fn test_clear_slice_uses_slice_shown_now() {
        let mut engine = engine();
        engine.backend_mut().draw(
            Side::Left,
            Annotation::new(RoiId::new("a"), square(2.0, 2.0, 6.0, 6.0)),
        );
        engine.on_roi_edited(Side::Left).unwrap();
        // Scrolled without an event reaching the engine.
        engine.backend_mut().scroll_to(Side::Left, 1);
        engine.backend_mut().scroll_to(Side::Right, 1);

        assert!(!engine.clear_tool(Side::Left, RegionScope::Slice));
        assert_eq!(engine.viewport(Side::Left).record_count(), 1);
        assert_eq!(engine.viewport(Side::Right).record_count(), 1);
    }

    #[test]
    fn test_layer_style_forwarded() {
        let mut engine = engine();
        engine.set_opacity(Side::Right, 0.25);
        engine.set_colormap(Side::Right, Colormap::HotIron);
        engine.set_visibility(Side::Right, false);
        let style = engine.backend().layer_style(Side::Right).unwrap();
        assert!((style.opacity - 0.25).abs() < f64::EPSILON);
        assert_eq!(style.colormap, Colormap::HotIron);
        assert!(!style.visible);
    }

    #[test]
    fn test_reset_stack_position() {
        let mut engine = engine();
        engine.backend_mut().scroll_to(Side::Left, 3);
        engine.backend_mut().scroll_to(Side::Right, 1);
        assert_eq!(engine.reset_stack_position(), Some(2));
        assert_eq!(engine.config().sync.delta_stack_index, 2);
    }

    #[test]
    fn test_translate_or_rotate_accumulates() {
        let mut engine = engine();
        let nudge = Nudge {
            x: Some(2.0),
            y: Some(-1.0),
            angle: Some(30.0),
        };
        engine.translate_or_rotate(Side::Right, nudge);
        engine.translate_or_rotate(Side::Right, nudge);
        let right = engine.viewport(Side::Right);
        assert!((right.dx - 4.0).abs() < f64::EPSILON);
        assert!((right.dy + 2.0).abs() < f64::EPSILON);
        let transform = engine.backend().viewport_transform(Side::Right).unwrap();
        assert!((transform.rotation - 30.0).abs() < f64::EPSILON);
        assert!((transform.translation.x - 4.0).abs() < f64::EPSILON);
    }
}
