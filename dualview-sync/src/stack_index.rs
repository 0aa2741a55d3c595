//! Slice-index lockstep between the two sides.
//!
//! A scroll on one side moves the other side to the same slice shifted by a
//! fixed calibrated offset. Slice loads complete asynchronously, so after
//! requesting a new index the driver polls until the renderer reports it or
//! the retry budget runs out.

use dualview_core::{Renderer, Side, StackPollPolicy};
use log::{debug, warn};

/// Scroll event detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceScroll {
    /// Signed number of slices moved.
    pub step: i64,
}

impl SliceScroll {
    /// Creates a scroll of `step` slices.
    #[must_use]
    pub fn new(step: i64) -> Self {
        Self { step }
    }
}

/// Result of the post-request confirmation poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPoll {
    /// The expected index was reported after `attempts` reads.
    Converged { attempts: u32 },
    /// The retry budget ran out; `observed` is the last reported index.
    Exhausted { observed: Option<usize> },
}

impl StackPoll {
    /// True when the expected index was observed.
    #[must_use]
    pub fn converged(&self) -> bool {
        matches!(self, StackPoll::Converged { .. })
    }
}

/// Index the other side should show, clamped to its stack.
///
/// `delta` is `left_index - right_index`: the right side follows the left
/// at `left - delta`, the left side follows the right at `right + delta`.
/// Returns `None` for an empty stack.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn target_index(
    source: Side,
    source_index: usize,
    delta: i64,
    other_size: usize,
) -> Option<usize> {
    if other_size == 0 {
        return None;
    }
    let source_index = i64::try_from(source_index).unwrap_or(i64::MAX);
    let target = match source {
        Side::Left => source_index.saturating_sub(delta),
        Side::Right => source_index.saturating_add(delta),
    };
    let last = i64::try_from(other_size - 1).unwrap_or(i64::MAX);
    Some(target.clamp(0, last) as usize)
}

/// Keeps the two slice positions in lockstep.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackIndexSynchronizer {
    policy: StackPollPolicy,
}

impl StackIndexSynchronizer {
    /// Creates a synchronizer with the given polling policy.
    #[must_use]
    pub fn new(policy: StackPollPolicy) -> Self {
        Self { policy }
    }

    /// Polling policy in use.
    #[must_use]
    pub fn policy(&self) -> StackPollPolicy {
        self.policy
    }

    /// Offset `left - right` between the currently displayed slices.
    ///
    /// `None` while either side is indeterminate.
    pub fn calibrate<R: Renderer + ?Sized>(renderer: &R) -> Option<i64> {
        let left = i64::try_from(renderer.current_slice_index(Side::Left)?).ok()?;
        let right = i64::try_from(renderer.current_slice_index(Side::Right)?).ok()?;
        Some(left - right)
    }

    /// Index to request on the other side, or `None` when nothing needs to
    /// move.
    pub fn plan<R: Renderer + ?Sized>(
        &self,
        renderer: &R,
        source: Side,
        scroll: SliceScroll,
        delta: i64,
    ) -> Option<usize> {
        if scroll.step == 0 {
            return None;
        }
        let other = source.other();
        let source_index = renderer.current_slice_index(source)?;
        let other_size = renderer.stack_size(other)?;
        let target = target_index(source, source_index, delta, other_size)?;
        if renderer.current_slice_index(other) == Some(target) {
            return None;
        }
        Some(target)
    }

    /// Moves the other side after a scroll on `source` and waits for the
    /// load to be reported.
    ///
    /// Returns `None` when no request was issued. The poll outcome is
    /// informational: callers carry on either way.
    pub async fn drive<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        source: Side,
        scroll: SliceScroll,
        delta: i64,
    ) -> Option<StackPoll> {
        let target = self.plan(renderer, source, scroll, delta)?;
        let other = source.other();
        debug!("{source} scrolled by {}, moving {other} to slice {target}", scroll.step);
        renderer.request_slice_index(other, target);
        Some(self.confirm(renderer, other, target).await)
    }

    /// Polls `side` until it reports `expected` or the budget is spent.
    pub async fn confirm<R: Renderer + ?Sized>(
        &self,
        renderer: &R,
        side: Side,
        expected: usize,
    ) -> StackPoll {
        let mut observed = None;
        for attempt in 1..=self.policy.attempts {
            observed = renderer.current_slice_index(side);
            if observed == Some(expected) {
                debug!("{side} reached slice {expected} after {attempt} read(s)");
                return StackPoll::Converged { attempts: attempt };
            }
            tokio::time::sleep(self.policy.interval()).await;
        }
        warn!(
            "{side} did not report slice {expected} after {} reads (last seen {observed:?}), continuing",
            self.policy.attempts
        );
        StackPoll::Exhausted { observed }
    }
}
