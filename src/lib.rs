//! Cadence is the animation core of a layered raster editor.
//!
//! Cadence models a document as a thread-aware scene graph whose nodes
//! carry keyframe channels, and orchestrates playback over it. It
//! computes *what* a frame shows and *when* frames can share content;
//! the pixels themselves live behind collaborator seams.
//!
//! # Architecture overview
//!
//! 1. **Intervals**: [`TimeSpan`] and the [`FrameSet`] algebra describe
//!    which frames a change touches, including unbounded tails.
//! 2. **Channels**: [`KeyframeChannel`] maps frame times to raster,
//!    scalar, or repeat keyframes and answers affected/identical-frame
//!    queries over them.
//! 3. **Cycles**: [`AnimationCycle`] replays a source keyframe range
//!    periodically through repeat instances.
//! 4. **Graph**: [`Node`] trees with single-writer/many-reader children
//!    lists, observed through [`NodeGraphListener`].
//! 5. **Timeline**: [`AnimationTimeline`] moves the playhead
//!    asynchronously, skipping regeneration when the target frame is
//!    provably identical to the current one.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **No pixels**: frame content, stroke execution, and undo stacks
//!   live behind the [`PaintDeviceFrameStore`], [`StrokeEngine`] and
//!   [`UndoAdapter`] traits.
//! - **Degenerate inputs are answers, not errors**: structural graph
//!   failures return `false`, missing keyframes return `None`, and
//!   illegal timeline configuration is a guarded no-op.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![allow(missing_docs_in_private_items)]

mod channel;
mod cycle;
mod engine;
mod foundation;
mod graph;
mod interval;
mod timeline;

pub use channel::channel::{
    ChannelEdit, ChannelId, KeyframeChannel, KeyframeSlot, ScalarLimits, TimelineBounds,
};
pub use channel::keyframe::{
    Interpolation, Keyframe, KeyframeValue, RasterKeyframe, RepeatKeyframe, ScalarKeyframe,
    TangentMode,
};
pub use channel::records::{ChannelRecord, CycleRecord, KeyframePayload, KeyframeRecord};
pub use cycle::cycle::AnimationCycle;
pub use engine::store::{FrameId, PaintDeviceFrameStore};
pub use engine::stroke::{StrokeEngine, StrokeId, StrokeJob, StrokeStrategy};
pub use engine::undo::UndoAdapter;
pub use foundation::core::{FrameTime, Framerate, Point, Rect, Vec2};
pub use foundation::error::{CadenceError, CadenceResult};
pub use graph::listener::{GraphSequence, NodeGraphListener};
pub use graph::node::{Node, NodeKind};
pub use interval::set::{FrameRun, FrameSet};
pub use interval::span::TimeSpan;
pub use timeline::interface::{
    AnimationTimeline, DocumentBounds, SwitchTimeFlags, TimelineListener,
};
pub use timeline::switch::{SwitchState, SwitchToken};
