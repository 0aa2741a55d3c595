//! End-to-end engine scenarios against the in-memory renderer.

use std::cell::Cell;
use std::rc::Rc;

use approx::assert_relative_eq;
use dualview_core::{
    Annotation, CoordinateMapping, EngineConfig, Nudge, Offset, RegionScope, Renderer,
    ResampleError, Resampler, RoiId, Side, SyncConfig, ViewportTransform, WindowSize,
};
use dualview_sync::{
    BilinearResampler, ComparisonEngine, MemoryRenderer, SliceScroll, StackPoll, Volume,
};

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Offset> {
    vec![
        Offset::new(x0, y0),
        Offset::new(x1, y0),
        Offset::new(x1, y1),
        Offset::new(x0, y1),
    ]
}

#[allow(clippy::cast_precision_loss)]
fn gradient(width: usize, depth: usize, spacing: f64) -> Volume {
    Volume::from_fn(width, width, depth, spacing, |x, y, z| (x + 2 * y + z) as f64)
}

/// Bilinear resampler that counts its calls.
struct CountingResampler {
    inner: BilinearResampler,
    calls: Rc<Cell<usize>>,
}

impl Resampler for CountingResampler {
    fn resample(
        &self,
        pixels: &[f64],
        from: WindowSize,
        to: WindowSize,
    ) -> Result<Vec<f64>, ResampleError> {
        self.calls.set(self.calls.get() + 1);
        self.inner.resample(pixels, from, to)
    }
}

#[tokio::test(start_paused = true)]
async fn test_scroll_moves_other_side_once_loaded() {
    let mut renderer = MemoryRenderer::new(gradient(16, 10, 1.0), gradient(16, 10, 1.0))
        .with_load_latency(3);
    renderer.scroll_to(Side::Left, 5);
    renderer.scroll_to(Side::Right, 5);
    let mut engine = ComparisonEngine::new(renderer, EngineConfig::default()).unwrap();
    assert_eq!(engine.reset_stack_position(), Some(0));

    engine.backend_mut().scroll_to(Side::Left, 6);
    let poll = engine.on_slice_scroll(Side::Left, SliceScroll::new(1)).await;

    assert_eq!(poll, Some(StackPoll::Converged { attempts: 4 }));
    assert_eq!(engine.viewport(Side::Right).stack_position, Some(6));
    let right = engine.viewport(Side::Right);
    assert_eq!(right.current_stack_index(engine.backend()), Some(6));
    assert_eq!(engine.viewport(Side::Left).stack_position, Some(6));
}

#[tokio::test(start_paused = true)]
async fn test_slow_load_exhausts_poll_budget_and_continues() {
    let mut renderer = MemoryRenderer::new(gradient(16, 10, 1.0), gradient(16, 10, 1.0))
        .with_load_latency(20);
    renderer.scroll_to(Side::Left, 5);
    renderer.scroll_to(Side::Right, 5);
    let mut engine = ComparisonEngine::new(renderer, EngineConfig::default()).unwrap();

    engine.backend_mut().scroll_to(Side::Left, 6);
    let poll = engine.on_slice_scroll(Side::Left, SliceScroll::new(1)).await;

    assert_eq!(poll, Some(StackPoll::Exhausted { observed: Some(5) }));
    assert!(!poll.unwrap().converged());
    assert_eq!(engine.viewport(Side::Right).stack_position, Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_scroll_target_clamped_to_shorter_stack() {
    let renderer = MemoryRenderer::new(gradient(16, 10, 1.0), gradient(16, 4, 1.0));
    let mut engine = ComparisonEngine::new(renderer, EngineConfig::default()).unwrap();

    engine.backend_mut().scroll_to(Side::Left, 8);
    let poll = engine.on_slice_scroll(Side::Left, SliceScroll::new(1)).await;

    assert_eq!(poll, Some(StackPoll::Converged { attempts: 1 }));
    assert_eq!(engine.viewport(Side::Right).stack_position, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_scroll_without_stack_sync_leaves_other_side() {
    let renderer = MemoryRenderer::new(gradient(16, 10, 1.0), gradient(16, 10, 1.0));
    let config =
        EngineConfig::default().with_sync(SyncConfig::default().with_synchronize_stack(false));
    let mut engine = ComparisonEngine::new(renderer, config).unwrap();

    engine.backend_mut().scroll_to(Side::Right, 4);
    let poll = engine.on_slice_scroll(Side::Right, SliceScroll::new(4)).await;

    assert_eq!(poll, None);
    assert_eq!(engine.viewport(Side::Left).stack_position, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_scroll_mirrors_rois_of_newly_shown_slice() {
    let mut renderer = MemoryRenderer::new(gradient(16, 4, 1.0), gradient(16, 4, 1.0));
    renderer.scroll_to(Side::Left, 2);
    let config = EngineConfig::default().with_sync(
        SyncConfig::default()
            .with_synchronize_roi(false)
            .with_synchronize_stack(false),
    );
    let mut engine = ComparisonEngine::new(renderer, config).unwrap();
    engine.backend_mut().draw(
        Side::Left,
        Annotation::new(RoiId::new("a"), square(2.0, 2.0, 8.0, 8.0)),
    );
    engine.on_roi_edited(Side::Left).unwrap();
    assert_eq!(engine.viewport(Side::Left).record_count(), 1);
    assert_eq!(engine.viewport(Side::Right).record_count(), 0);

    engine.set_synchronize_roi(true);
    engine.set_synchronize_stack(true);
    engine.backend_mut().scroll_to(Side::Left, 3);
    engine.on_slice_scroll(Side::Left, SliceScroll::new(1)).await;
    assert!(engine.backend().annotations(Side::Right).is_empty());

    engine.backend_mut().scroll_to(Side::Left, 2);
    let poll = engine.on_slice_scroll(Side::Left, SliceScroll::new(-1)).await;

    assert_eq!(poll, Some(StackPoll::Converged { attempts: 1 }));
    assert_eq!(engine.viewport(Side::Right).stack_position, Some(2));
    let copies = engine.backend().annotations(Side::Right);
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].correlation, RoiId::new("a"));
    assert_eq!(engine.viewport(Side::Right).record_count(), 1);
    assert_eq!(engine.last_edit().map(|e| e.side), Some(Side::Left));
    assert!(engine.has_pending_stats());
}

#[test]
fn test_square_copied_across_spacings() {
    let renderer = MemoryRenderer::new(gradient(64, 2, 1.0), gradient(32, 2, 2.0));
    let mut engine = ComparisonEngine::new(renderer, EngineConfig::default()).unwrap();
    let original = square(10.0, 10.0, 20.0, 20.0);
    engine.backend_mut().draw(
        Side::Left,
        Annotation::new(RoiId::new("square"), original.clone()),
    );

    let outcome = engine.on_roi_edited(Side::Left).unwrap();
    assert!(outcome.mutated);
    assert_eq!(outcome.completed.len(), 2);

    let left = engine.backend().annotations(Side::Left);
    let right = engine.backend().annotations(Side::Right);
    assert_eq!(left.len(), 1);
    assert_eq!(right.len(), 1);
    assert!(left[0].visible);
    assert!(right[0].visible);
    assert_ne!(right[0].uuid, left[0].uuid);
    assert_eq!(right[0].correlation, left[0].correlation);
    assert_eq!(right[0].points, square(5.0, 5.0, 10.0, 10.0));

    // Mapping the copy back lands on the original polygon.
    let back = CoordinateMapping::between(
        engine.backend(),
        engine.viewport(Side::Right),
        engine.viewport(Side::Left),
    )
    .unwrap();
    for (p, q) in back.apply_all(&right[0].points).iter().zip(&original) {
        assert_relative_eq!(p.x, q.x, epsilon = 1e-9);
        assert_relative_eq!(p.y, q.y, epsilon = 1e-9);
    }
}

#[test]
fn test_mapping_round_trip_with_manual_offsets() {
    let renderer = MemoryRenderer::new(gradient(100, 1, 1.0), gradient(80, 1, 1.25));
    let mut engine = ComparisonEngine::new(renderer, EngineConfig::default()).unwrap();
    engine.translate_or_rotate(
        Side::Right,
        Nudge {
            x: Some(3.5),
            y: Some(-7.0),
            angle: None,
        },
    );
    let polygon = vec![
        Offset::new(12.25, 40.0),
        Offset::new(55.5, 18.75),
        Offset::new(70.0, 66.0),
    ];
    engine
        .backend_mut()
        .draw(Side::Left, Annotation::new(RoiId::new("tri"), polygon.clone()));
    engine.on_roi_edited(Side::Left).unwrap();

    let copy = engine.backend().annotations(Side::Right);
    assert_eq!(copy.len(), 1);
    let back = CoordinateMapping::between(
        engine.backend(),
        engine.viewport(Side::Right),
        engine.viewport(Side::Left),
    )
    .unwrap();
    for (p, q) in back.apply_all(&copy[0].points).iter().zip(&polygon) {
        assert_relative_eq!(p.x, q.x, epsilon = 1e-9);
        assert_relative_eq!(p.y, q.y, epsilon = 1e-9);
    }
}

#[test]
fn test_identical_images_have_zero_difference() {
    let renderer = MemoryRenderer::new(gradient(32, 2, 1.0), gradient(32, 2, 1.0));
    let mut engine = ComparisonEngine::new(renderer, EngineConfig::default()).unwrap();
    engine.backend_mut().draw(
        Side::Left,
        Annotation::new(RoiId::new("same"), square(4.0, 4.0, 12.0, 12.0)),
    );
    engine.on_roi_edited(Side::Left).unwrap();
    assert!(engine.run_deferred());

    let stats = engine.stats().unwrap();
    assert_eq!(stats.scope, RegionScope::LastRoi);
    assert_eq!(stats.count, 64);
    assert_relative_eq!(stats.diff.mean, 0.0);
    assert_relative_eq!(stats.diff.std, 0.0);
    assert_relative_eq!(stats.left.mean, stats.right.mean);
    // A uniform difference is kept out of the overlay.
    assert_eq!(engine.backend().overlay(Side::Left).unwrap().lit_pixels(), 0);
}

#[test]
fn test_clear_volume_without_roi_sync_keeps_other_side() {
    let renderer = MemoryRenderer::new(gradient(32, 3, 1.0), gradient(32, 3, 1.0));
    let config =
        EngineConfig::default().with_sync(SyncConfig::default().with_synchronize_roi(false));
    let mut engine = ComparisonEngine::new(renderer, config).unwrap();
    engine.backend_mut().draw(
        Side::Left,
        Annotation::new(RoiId::new("l"), square(2.0, 2.0, 8.0, 8.0)),
    );
    engine.on_roi_edited(Side::Left).unwrap();
    engine.backend_mut().draw(
        Side::Right,
        Annotation::new(RoiId::new("r"), square(10.0, 10.0, 14.0, 14.0)),
    );
    engine.on_roi_edited(Side::Right).unwrap();
    assert_eq!(engine.viewport(Side::Left).record_count(), 1);
    assert_eq!(engine.viewport(Side::Right).record_count(), 1);

    let redraws = engine.backend().redraw_count(Side::Left);
    assert!(engine.clear_tool(Side::Left, RegionScope::Volume));

    assert_eq!(engine.viewport(Side::Left).record_count(), 0);
    assert!(engine.backend().annotations(Side::Left).is_empty());
    assert_eq!(engine.viewport(Side::Right).record_count(), 1);
    assert_eq!(engine.backend().annotations(Side::Right).len(), 1);
    assert!(engine.backend().redraw_count(Side::Left) > redraws);
}

#[test]
fn test_clear_last_roi_with_sync_clears_both_sides() {
    let renderer = MemoryRenderer::new(gradient(32, 3, 1.0), gradient(32, 3, 1.0));
    let mut engine = ComparisonEngine::new(renderer, EngineConfig::default()).unwrap();
    engine.backend_mut().draw(
        Side::Left,
        Annotation::new(RoiId::new("a"), square(2.0, 2.0, 8.0, 8.0)),
    );
    engine.on_roi_edited(Side::Left).unwrap();

    assert!(engine.clear_tool(Side::Right, RegionScope::LastRoi));
    assert_eq!(engine.viewport(Side::Left).record_count(), 0);
    assert_eq!(engine.viewport(Side::Right).record_count(), 0);
    assert!(engine.backend().annotations(Side::Left).is_empty());
    assert!(engine.backend().annotations(Side::Right).is_empty());
    assert!(!engine.clear_tool(Side::Right, RegionScope::LastRoi));
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_rois_reuse_cached_difference() {
    let calls = Rc::new(Cell::new(0));
    let resampler = CountingResampler {
        inner: BilinearResampler::new(),
        calls: Rc::clone(&calls),
    };
    let renderer = MemoryRenderer::new(gradient(64, 2, 1.0), gradient(32, 2, 2.0));
    let mut engine =
        ComparisonEngine::with_resampler(renderer, resampler, EngineConfig::default()).unwrap();
    engine.backend_mut().draw(
        Side::Left,
        Annotation::new(RoiId::new("a"), square(10.0, 10.0, 30.0, 30.0)),
    );
    engine.on_roi_edited(Side::Left).unwrap();
    let resamples = calls.get();
    let samples = engine.backend().sample_calls();
    assert!(resamples > 0);

    // A refresh with nothing changed reads no pixels at all.
    engine.on_slice_scroll(Side::Left, SliceScroll::new(0)).await;
    assert_eq!(calls.get(), resamples);
    assert_eq!(engine.backend().sample_calls(), samples);

    // Moving the polygon invalidates its entry.
    assert!(engine.backend_mut().edit_points(
        Side::Left,
        &RoiId::new("a"),
        square(12.0, 12.0, 30.0, 30.0)
    ));
    engine.on_roi_edited(Side::Left).unwrap();
    assert!(calls.get() > resamples);
    assert!(engine.backend().sample_calls() > samples);
}

#[test]
fn test_pan_zoom_settles_after_one_round_trip() {
    let mut renderer = MemoryRenderer::new(gradient(64, 1, 1.0), gradient(32, 1, 2.0));
    renderer.set_viewport_transform(
        Side::Left,
        ViewportTransform {
            scale: 2.0,
            translation: Offset::new(10.0, 4.0),
            rotation: 0.0,
        },
    );
    let mut engine = ComparisonEngine::new(renderer, EngineConfig::default()).unwrap();

    assert!(engine.on_viewport_changed(Side::Left));
    let right = engine.backend().viewport_transform(Side::Right).unwrap();
    assert_relative_eq!(right.scale, 4.0);
    assert_eq!(right.translation, Offset::new(5.0, 2.0));

    // The renderer notifies back; neither side moves again.
    assert!(!engine.on_viewport_changed(Side::Right));
    assert!(!engine.on_viewport_changed(Side::Left));
}

#[test]
fn test_disabled_side_blocks_sync() {
    let mut renderer = MemoryRenderer::new(gradient(16, 1, 1.0), gradient(16, 1, 1.0));
    renderer.set_enabled(Side::Right, false);
    let mut engine = ComparisonEngine::new(renderer, EngineConfig::default()).unwrap();
    assert!(!engine.viewport(Side::Right).loaded);
    assert!(!engine.on_viewport_changed(Side::Left));
    assert_eq!(engine.reset_stack_position(), None);
}
