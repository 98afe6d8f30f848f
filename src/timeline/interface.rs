use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use crate::channel::channel::TimelineBounds;
use crate::engine::stroke::{StrokeEngine, StrokeJob, StrokeStrategy};
use crate::foundation::core::{FrameTime, Framerate, Rect};
use crate::graph::node::Node;
use crate::interval::set::FrameSet;
use crate::interval::span::TimeSpan;
use crate::timeline::switch::{SwitchState, SwitchToken};

/// Authoritative per-document playhead and canvas rect, shared with
/// every keyframe channel of the document.
#[derive(Debug)]
pub struct DocumentBounds {
    current_time: AtomicI64,
    bounds: Mutex<Rect>,
}

impl DocumentBounds {
    /// Bounds starting at frame 0 over the given canvas rect.
    pub fn new(bounds: Rect) -> Arc<Self> {
        Arc::new(Self {
            current_time: AtomicI64::new(0),
            bounds: Mutex::new(bounds),
        })
    }

    /// Replace the canvas rect.
    pub fn set_bounds(&self, bounds: Rect) {
        *lock(&self.bounds) = bounds;
    }

    pub(crate) fn set_current_time(&self, time: FrameTime) {
        self.current_time.store(time, Ordering::Release);
    }
}

impl TimelineBounds for DocumentBounds {
    fn current_time(&self) -> FrameTime {
        self.current_time.load(Ordering::Acquire)
    }

    fn bounds(&self) -> Rect {
        *lock(&self.bounds)
    }
}

/// Options of an asynchronous time switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwitchTimeFlags {
    /// Regenerate the target frame even when it is provably identical
    /// to the current one.
    pub force_regeneration: bool,
}

/// Observer of timeline-level events.
///
/// All hooks default to no-ops.
pub trait TimelineListener: Send + Sync {
    /// The UI playhead moved. The authoritative time follows once the
    /// switch stroke executes.
    fn ui_time_changed(&self, time: FrameTime) {
        let _ = time;
    }

    /// Displayed content of the given frames changed within `rect`.
    fn frames_changed(&self, frames: &FrameSet, rect: Rect) {
        let _ = (frames, rect);
    }

    /// The document's full clip range changed.
    fn full_clip_range_changed(&self, span: TimeSpan) {
        let _ = span;
    }

    /// The playback subrange changed.
    fn playback_range_changed(&self, span: TimeSpan) {
        let _ = span;
    }

    /// The framerate changed.
    fn framerate_changed(&self, framerate: Framerate) {
        let _ = framerate;
    }

    /// Regeneration of `time` finished; its projection is current.
    fn frame_ready(&self, time: FrameTime) {
        let _ = time;
    }

    /// An in-flight regeneration was cancelled.
    fn frame_cancelled(&self) {}
}

#[derive(Debug)]
struct TimelineState {
    current_ui_time: FrameTime,
    full_clip_range: TimeSpan,
    playback_range: TimeSpan,
    framerate: Framerate,
    cached_last_frame: Option<FrameTime>,
    switch_state: SwitchState,
    active_token: Option<Arc<SwitchToken>>,
}

/// Per-document animation orchestrator.
///
/// Owns the playhead, clip and playback ranges, and the framerate, and
/// drives asynchronous time switches through the external stroke
/// engine. The UI time moves immediately; the authoritative time
/// follows when the switch stroke executes, and frame regeneration is
/// scheduled separately and only when the target frame can actually
/// differ from the current one.
pub struct AnimationTimeline {
    root: Arc<Node>,
    engine: Arc<dyn StrokeEngine>,
    bounds: Arc<DocumentBounds>,
    listener: RwLock<Weak<dyn TimelineListener>>,
    state: Mutex<TimelineState>,
}

impl AnimationTimeline {
    /// A timeline over the graph rooted at `root`.
    ///
    /// `bounds` must be the same value the document's channels were
    /// created with, so that channel edits and the timeline agree on
    /// the current time.
    pub fn new(
        root: Arc<Node>,
        engine: Arc<dyn StrokeEngine>,
        bounds: Arc<DocumentBounds>,
    ) -> Arc<Self> {
        Arc::new(Self {
            root,
            engine,
            bounds,
            listener: RwLock::new(Weak::<NullTimelineListener>::new()),
            state: Mutex::new(TimelineState {
                current_ui_time: 0,
                full_clip_range: TimeSpan::finite(0, 100),
                playback_range: TimeSpan::finite(0, 100),
                framerate: Framerate::default(),
                cached_last_frame: None,
                switch_state: SwitchState::Idle,
                active_token: None,
            }),
        })
    }

    /// Subscribe `listener` to timeline events.
    pub fn set_listener(&self, listener: Weak<dyn TimelineListener>) {
        *self
            .listener
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = listener;
    }

    fn listener(&self) -> Option<Arc<dyn TimelineListener>> {
        self.listener
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .upgrade()
    }

    /// The graph this timeline drives.
    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// The shared playhead and canvas rect.
    pub fn bounds(&self) -> &Arc<DocumentBounds> {
        &self.bounds
    }

    /// The authoritative current time.
    pub fn current_time(&self) -> FrameTime {
        self.bounds.current_time()
    }

    /// The UI playhead, which may run ahead of the authoritative time
    /// while a switch is in flight.
    pub fn current_ui_time(&self) -> FrameTime {
        lock(&self.state).current_ui_time
    }

    /// The current switch phase.
    pub fn switch_state(&self) -> SwitchState {
        lock(&self.state).switch_state
    }

    // ---- configuration ------------------------------------------------

    /// The document's full clip range.
    pub fn full_clip_range(&self) -> TimeSpan {
        lock(&self.state).full_clip_range
    }

    /// Replace the full clip range. Infinite and empty ranges are
    /// ignored.
    pub fn set_full_clip_range(&self, span: TimeSpan) {
        if span.is_empty() || span.is_infinite() {
            return;
        }
        {
            let mut state = lock(&self.state);
            state.full_clip_range = span;
            state.cached_last_frame = None;
        }
        if let Some(l) = self.listener() {
            l.full_clip_range_changed(span);
        }
    }

    /// The playback subrange.
    pub fn playback_range(&self) -> TimeSpan {
        lock(&self.state).playback_range
    }

    /// Replace the playback subrange. Infinite and empty ranges are
    /// ignored.
    pub fn set_playback_range(&self, span: TimeSpan) {
        if span.is_empty() || span.is_infinite() {
            return;
        }
        lock(&self.state).playback_range = span;
        if let Some(l) = self.listener() {
            l.playback_range_changed(span);
        }
    }

    /// The document framerate.
    pub fn framerate(&self) -> Framerate {
        lock(&self.state).framerate
    }

    /// Replace the framerate. [`Framerate`] is validated at
    /// construction, so every value reaching this point is positive.
    pub fn set_framerate(&self, framerate: Framerate) {
        lock(&self.state).framerate = framerate;
        if let Some(l) = self.listener() {
            l.framerate_changed(framerate);
        }
    }

    /// Number of frames in the document: the clip range extended to
    /// cover the last keyframe of any channel and the UI playhead.
    /// The last-keyframe scan is memoized; recomputed lazily after a
    /// change notification.
    pub fn total_length(&self) -> i64 {
        let mut state = lock(&self.state);
        let last_key = match state.cached_last_frame {
            Some(cached) => cached,
            None => {
                let computed = self.last_keyframe_over_graph();
                state.cached_last_frame = Some(computed);
                computed
            }
        };
        let clip_end = state.full_clip_range.end().unwrap_or(0);
        clip_end.max(last_key).max(state.current_ui_time) + 1
    }

    /// Drop the memoized last-keyframe time.
    ///
    /// Graph owners forward [`crate::NodeGraphListener::invalidate_frames`]
    /// here, so a keyframe moved past the clip end lengthens the
    /// document without a full change notification.
    pub fn invalidate_cached_length(&self) {
        lock(&self.state).cached_last_frame = None;
    }

    fn last_keyframe_over_graph(&self) -> FrameTime {
        let mut last = 0;
        Node::visit(&self.root, &mut |node| {
            for id in node.channel_ids() {
                let channel_last = node
                    .channel(id, |channel| channel.all_keyframe_times().last().copied())
                    .flatten();
                if let Some(t) = channel_last {
                    last = last.max(t);
                }
            }
        });
        last
    }

    // ---- time switching -----------------------------------------------

    /// Move the playhead to `time`.
    ///
    /// The UI time changes synchronously. A switch stroke is scheduled
    /// on the engine; a regeneration stroke follows only when the
    /// target frame is not provably identical to the current one. A
    /// newer request arriving while a switch is still pending retargets
    /// the pending token instead of scheduling another stroke.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn switch_current_time_async(&self, time: FrameTime, flags: SwitchTimeFlags) {
        {
            let state = lock(&self.state);
            if state.current_ui_time == time && !flags.force_regeneration {
                return;
            }
        }

        let current = self.current_time();
        let needs_regeneration = flags.force_regeneration
            || !self
                .calculate_identical_frames_recursive(
                    &self.root,
                    current,
                    TimeSpan::finite(0, current.max(time)),
                )
                .contains(time);

        // Decide everything under the lock, then submit with it
        // released: an engine may run a stroke synchronously and call
        // back into [`Self::apply_switch`].
        let mut state = lock(&self.state);
        state.current_ui_time = time;

        let coalesced = matches!(
            &state.active_token,
            Some(token) if token.try_reset_destination_time(time)
        );
        let fresh_token = if coalesced {
            None
        } else {
            let token = Arc::new(SwitchToken::new(time));
            state.active_token = Some(token.clone());
            Some(token)
        };
        state.switch_state = if needs_regeneration {
            SwitchState::Regenerating(time)
        } else {
            SwitchState::SwitchRequested(time)
        };
        drop(state);

        if let Some(token) = fresh_token {
            let stroke = self
                .engine
                .start_stroke(StrokeStrategy::SwitchTime { token });
            self.engine.add_job(stroke, StrokeJob::SwitchTime);
            self.engine.end_stroke(stroke);
        }
        if needs_regeneration {
            let region = self.bounds.bounds();
            let stroke = self
                .engine
                .start_stroke(StrokeStrategy::Regenerate { time });
            self.engine
                .add_job(stroke, StrokeJob::Regenerate { time, region });
            self.engine.end_stroke(stroke);
        }

        if let Some(l) = self.listener() {
            l.ui_time_changed(time);
        }
    }

    /// Engine callback: the switch stroke for `token` is executing.
    /// Commits the token's destination as the authoritative time and
    /// closes the coalescing window.
    pub fn apply_switch(&self, token: &Arc<SwitchToken>) {
        token.mark_regeneration_started();
        let destination = token.destination();
        self.bounds.set_current_time(destination);

        let mut state = lock(&self.state);
        if let Some(active) = &state.active_token
            && Arc::ptr_eq(active, token)
        {
            state.active_token = None;
        }
        if state.switch_state == SwitchState::SwitchRequested(destination) {
            state.switch_state = SwitchState::Idle;
        }
    }

    /// Engine callback: regeneration of `time` finished.
    pub fn frame_regenerated(&self, time: FrameTime) {
        {
            let mut state = lock(&self.state);
            if state.switch_state == SwitchState::Regenerating(time) {
                state.switch_state = SwitchState::Idle;
            }
        }
        if let Some(l) = self.listener() {
            l.frame_ready(time);
        }
    }

    /// Engine callback: an in-flight regeneration was dropped.
    pub fn regeneration_cancelled(&self) {
        lock(&self.state).switch_state = SwitchState::Idle;
        if let Some(l) = self.listener() {
            l.frame_cancelled();
        }
    }

    /// Schedule background regeneration of `time` over `dirty_region`,
    /// without moving the playhead.
    pub fn request_frame_regeneration(&self, time: FrameTime, dirty_region: Rect) {
        let stroke = self
            .engine
            .start_stroke(StrokeStrategy::Regenerate { time });
        self.engine.add_job(
            stroke,
            StrokeJob::Regenerate {
                time,
                region: dirty_region,
            },
        );
        self.engine.end_stroke(stroke);
    }

    // ---- change notification ------------------------------------------

    /// Report a content change on `node` (and its subtree when
    /// `recursive`): frames affected at the current time are announced
    /// through the listener, and the length memo is dropped.
    #[tracing::instrument(skip(self, node, rects), level = "debug")]
    pub fn notify_node_changed(&self, node: &Arc<Node>, rects: &[Rect], recursive: bool) {
        let current = self.current_time();
        let mut affected = FrameSet::empty();

        let mut collect = |n: &Arc<Node>| {
            for id in n.channel_ids() {
                if let Some(set) = n.channel(id, |channel| channel.affected_frames(current)) {
                    affected |= set;
                }
            }
        };
        if recursive {
            Node::visit(node, &mut collect);
        } else {
            collect(node);
        }

        lock(&self.state).cached_last_frame = None;

        let rect = rects
            .iter()
            .copied()
            .reduce(|acc, r| acc.union(r))
            .unwrap_or_else(|| self.bounds.bounds());
        if let Some(l) = self.listener() {
            l.frames_changed(&affected, rect);
        }
    }

    /// Frames guaranteed identical to `time` across every channel of
    /// the subtree under `node`, restricted to `range`.
    pub fn calculate_identical_frames_recursive(
        &self,
        node: &Arc<Node>,
        time: FrameTime,
        range: TimeSpan,
    ) -> FrameSet {
        let mut identical = FrameSet::from_span(range);
        Node::visit(node, &mut |n| {
            for id in n.channel_ids() {
                if let Some(set) =
                    n.channel(id, |channel| channel.identical_frames(time, Some(range)))
                {
                    identical &= set;
                }
            }
        });
        identical
    }
}

/// Placeholder listener type used to build an empty `Weak`.
struct NullTimelineListener;

impl TimelineListener for NullTimelineListener {}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/interface.rs"]
mod tests;
