use std::sync::Arc;

use crate::foundation::core::{FrameTime, Rect};
use crate::timeline::switch::SwitchToken;

/// Identifier of a stroke accepted by the external stroke engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StrokeId(pub u64);

/// What a scheduled stroke is for.
///
/// Time switches and frame regeneration are submitted as *separate*
/// strokes so the cheap switch becomes visible even while regeneration
/// is still catching up.
#[derive(Clone, Debug)]
pub enum StrokeStrategy {
    /// Set the authoritative current time to the token's destination.
    /// The token stays retargetable until regeneration begins.
    SwitchTime {
        /// Shared, retargetable destination of the switch.
        token: Arc<SwitchToken>,
    },
    /// Recompute node projections for one frame.
    Regenerate {
        /// Frame being regenerated.
        time: FrameTime,
    },
}

/// One unit of work inside a stroke.
#[derive(Clone, Debug)]
pub enum StrokeJob {
    /// Apply the owning switch stroke's destination time.
    SwitchTime,
    /// Regenerate the given frame over the given region.
    Regenerate {
        /// Frame to regenerate.
        time: FrameTime,
        /// Region of the canvas to recompute.
        region: Rect,
    },
}

/// External scheduling engine executing strokes on its own workers.
///
/// This core only submits; thread count, execution order within the
/// engine's rules, and cancellation all belong to the collaborator.
/// The one ordering guarantee the core relies on is that strokes are
/// accepted in submission order, so a regeneration stroke for time `t`
/// is never started before the switch stroke for `t` was accepted.
pub trait StrokeEngine: Send + Sync {
    /// Open a stroke for the given strategy.
    fn start_stroke(&self, strategy: StrokeStrategy) -> StrokeId;

    /// Append a job to an open stroke.
    fn add_job(&self, stroke: StrokeId, job: StrokeJob);

    /// Close the stroke; no further jobs may be added.
    fn end_stroke(&self, stroke: StrokeId);
}
