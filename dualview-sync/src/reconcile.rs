//! Bidirectional ROI reconciliation.
//!
//! After an edit on one ("driving") side the reconciler compares the
//! annotation sets the renderer holds for both sides and applies at most one
//! structural change:
//!
//! - sync disabled: nothing is mirrored, qualifying driving ROIs are only
//!   reported as completed;
//! - exactly one side populated: every ROI is copied onto the empty side;
//! - both populated: the first driving ROI the caller reports as changed
//!   replaces its correlated counterpart on the passive side.
//!
//! Copies get a fresh uuid and keep the original's correlation id, so a
//! mirrored pair can always be found again from either side.

use dualview_core::{
    polygon_area, Annotation, CoordinateMapping, LastEdit, Renderer, Result, RoiId, Side,
    SyncConfig, ViewportState,
};
use log::debug;

use crate::stats::measure_region;

/// An annotation the owning side should record.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub side: Side,
    pub annotation: Annotation,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Annotations to record, originals and copies alike.
    pub completed: Vec<Completion>,
    /// Whether any annotation set was changed.
    pub mutated: bool,
    /// The most recently completed original ROI.
    pub last_edit: Option<LastEdit>,
}

impl ReconcileOutcome {
    fn complete(&mut self, side: Side, annotation: Annotation) {
        self.completed.push(Completion { side, annotation });
    }

    fn complete_pair(&mut self, original: (Side, Annotation), copy: (Side, Annotation)) {
        self.last_edit = Some(LastEdit {
            side: original.0,
            correlation: original.1.correlation.clone(),
        });
        self.complete(copy.0, copy.1);
        self.complete(original.0, original.1);
    }
}

/// Merges the two sides' ROI sets.
#[derive(Debug, Clone)]
pub struct RoiReconciler {
    sync: SyncConfig,
    area_epsilon: f64,
}

impl RoiReconciler {
    /// Creates a reconciler for the given toggles and qualifying area.
    #[must_use]
    pub fn new(sync: &SyncConfig, area_epsilon: f64) -> Self {
        Self {
            sync: sync.clone(),
            area_epsilon,
        }
    }

    /// Runs one pass driven by an edit on `driving`.
    ///
    /// `changed` decides whether a driving-side annotation differs from what
    /// was last recorded for it.
    ///
    /// # Errors
    ///
    /// Returns an error when a copy is needed but no coordinate mapping
    /// between the sides can be built.
    pub fn reconcile<R, F>(
        &self,
        renderer: &mut R,
        driving: &ViewportState,
        passive: &ViewportState,
        mut changed: F,
    ) -> Result<ReconcileOutcome>
    where
        R: Renderer + ?Sized,
        F: FnMut(&Annotation) -> bool,
    {
        let mut outcome = ReconcileOutcome::default();
        if driving.side() == passive.side() {
            return Ok(outcome);
        }
        let driving_set = renderer.annotations(driving.side());

        if !self.sync.is_roi_sync_active() {
            let qualifying = driving_set
                .into_iter()
                .filter(|a| a.qualifies(self.area_epsilon));
            for a in qualifying {
                outcome.last_edit = Some(LastEdit {
                    side: driving.side(),
                    correlation: a.correlation.clone(),
                });
                outcome.complete(driving.side(), a);
            }
            return Ok(outcome);
        }

        let passive_set = renderer.annotations(passive.side());
        match (driving_set.is_empty(), passive_set.is_empty()) {
            (true, true) => return Ok(outcome),
            (false, true) => {
                self.copy_all(renderer, driving, passive, driving_set, &mut outcome)?;
            }
            (true, false) => {
                self.copy_all(renderer, passive, driving, passive_set, &mut outcome)?;
            }
            (false, false) => {
                if let Some(a) = driving_set.into_iter().find(|a| changed(a)) {
                    self.replace_counterpart(
                        renderer,
                        driving,
                        passive,
                        &passive_set,
                        a,
                        &mut outcome,
                    )?;
                }
            }
        }

        if outcome.mutated {
            renderer.sync_cursor_handles(driving.side(), passive.side());
            renderer.redraw(driving.side());
            renderer.redraw(passive.side());
        }
        Ok(outcome)
    }

    /// Copies every annotation of `from` onto the empty side `to`.
    fn copy_all<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        from: &ViewportState,
        to: &ViewportState,
        set: Vec<Annotation>,
        outcome: &mut ReconcileOutcome,
    ) -> Result<()> {
        let mapping = CoordinateMapping::between(renderer, from, to)?;
        debug!(
            "copying {} ROI(s) from {} to {}",
            set.len(),
            from.side(),
            to.side()
        );
        for a in set {
            let copy = self.mirror(renderer, &a, &mapping, to);
            renderer.add_annotation(to.side(), copy.clone());
            outcome.mutated = true;
            if a.qualifies(self.area_epsilon) {
                outcome.complete_pair((from.side(), a), (to.side(), copy));
            }
        }
        Ok(())
    }

    /// Replaces the passive counterpart of one changed driving annotation.
    fn replace_counterpart<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        driving: &ViewportState,
        passive: &ViewportState,
        passive_set: &[Annotation],
        original: Annotation,
        outcome: &mut ReconcileOutcome,
    ) -> Result<()> {
        let mapping = CoordinateMapping::between(renderer, driving, passive)?;
        let stale: Vec<&RoiId> = passive_set
            .iter()
            .filter(|p| p.correlation == original.correlation)
            .map(|p| &p.uuid)
            .collect();
        for uuid in &stale {
            renderer.remove_annotation(passive.side(), uuid);
        }
        debug!(
            "{} ROI {} changed, replacing {} counterpart(s) on {}",
            driving.side(),
            original.uuid,
            stale.len(),
            passive.side()
        );

        let copy = self.mirror(renderer, &original, &mapping, passive);
        renderer.add_annotation(passive.side(), copy.clone());
        outcome.mutated = true;
        if original.qualifies(self.area_epsilon) {
            outcome.complete_pair((driving.side(), original), (passive.side(), copy));
        } else {
            renderer.set_annotation_visible(driving.side(), &original.uuid, true);
        }
        Ok(())
    }

    /// Translated copy of `original` for the receiving side.
    fn mirror<R: Renderer + ?Sized>(
        &self,
        renderer: &R,
        original: &Annotation,
        mapping: &CoordinateMapping,
        receiving: &ViewportState,
    ) -> Annotation {
        let points = mapping.apply_all(&original.points);
        let area = polygon_area(&points);
        Annotation {
            uuid: RoiId::generate(),
            correlation: original.correlation.clone(),
            stats: measure_region(renderer, receiving.side(), &points),
            points,
            area,
            closable: original.closable,
            visible: original.area < self.area_epsilon || receiving.visible,
        }
    }
}
