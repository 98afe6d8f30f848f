use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Weak};

use crate::channel::keyframe::{
    Interpolation, Keyframe, KeyframeValue, RasterKeyframe, ScalarKeyframe, interpolated_value,
};
use crate::cycle::cycle::AnimationCycle;
use crate::engine::store::{FrameId, PaintDeviceFrameStore};
use crate::foundation::core::{FrameTime, Rect};
use crate::graph::node::Node;
use crate::interval::set::FrameSet;
use crate::interval::span::TimeSpan;

/// Identity of a keyframe channel on a node.
///
/// `Content` carries raster frames; every other channel animates one
/// scalar parameter of the node.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ChannelId {
    /// Pixel content of the layer.
    Content,
    /// Layer opacity, `0.0..=1.0`.
    Opacity,
    /// Horizontal translation.
    PositionX,
    /// Vertical translation.
    PositionY,
    /// Horizontal scale factor.
    ScaleX,
    /// Vertical scale factor.
    ScaleY,
    /// Horizontal shear.
    ShearX,
    /// Vertical shear.
    ShearY,
    /// Rotation around the view axis, radians.
    RotationZ,
}

impl ChannelId {
    /// Whether this channel stores raster frames rather than scalars.
    pub fn is_raster(self) -> bool {
        matches!(self, Self::Content)
    }

    /// Stable identifier used in stored records and log output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Opacity => "opacity",
            Self::PositionX => "position_x",
            Self::PositionY => "position_y",
            Self::ScaleX => "scale_x",
            Self::ScaleY => "scale_y",
            Self::ShearX => "shear_x",
            Self::ShearY => "shear_y",
            Self::RotationZ => "rotation_z",
        }
    }

    /// Value a scalar channel evaluates to before any keyframe exists.
    pub fn neutral_value(self) -> f64 {
        match self {
            Self::Opacity | Self::ScaleX | Self::ScaleY => 1.0,
            _ => 0.0,
        }
    }

    /// Built-in value bounds, where the parameter has any.
    pub fn default_limits(self) -> Option<ScalarLimits> {
        match self {
            Self::Opacity => Some(ScalarLimits {
                lower: 0.0,
                upper: 1.0,
            }),
            _ => None,
        }
    }
}

/// Inclusive value bounds applied to scalar writes. Values already
/// stored are never re-clamped when the limits change.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScalarLimits {
    /// Smallest allowed value.
    pub lower: f64,
    /// Largest allowed value.
    pub upper: f64,
}

impl ScalarLimits {
    /// Clamp `value` into the bounds.
    pub fn clamp(self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

/// Document-level context a channel needs when deciding what an edit
/// invalidates: the authoritative playhead and the canvas rect.
pub trait TimelineBounds: Send + Sync {
    /// The authoritative current frame.
    fn current_time(&self) -> FrameTime;

    /// Full canvas rect, used when an edit has no tighter dirty region.
    fn bounds(&self) -> Rect;
}

/// One slot touched by an edit: the keyframe that was there before and
/// the one that is there now (`None` means the slot is vacant).
#[derive(Clone, Debug)]
pub struct KeyframeSlot {
    /// The slot's frame time.
    pub time: FrameTime,
    /// Occupant before the edit.
    pub before: Option<Keyframe>,
    /// Occupant after the edit.
    pub after: Option<Keyframe>,
}

/// Value record of one channel mutation, sufficient to revert it.
///
/// The channel only *produces* these; pushing them onto an undo stack
/// and deciding when to [`KeyframeChannel::discard`] them belongs to
/// the caller.
#[derive(Clone, Debug)]
pub struct ChannelEdit {
    /// Channel the edit applies to.
    pub channel: ChannelId,
    /// Touched slots, in application order.
    pub slots: Vec<KeyframeSlot>,
}

/// A sequence of keyframes over one animated property of a node.
///
/// Keyframes live in a time-ordered map; the map key is the single
/// source of truth for a keyframe's time. Repeat instances share their
/// [`AnimationCycle`] by reference and are registered with it on
/// insertion and unregistered on removal, so cycle math always sees the
/// channel's current repeats.
pub struct KeyframeChannel {
    id: ChannelId,
    keys: BTreeMap<FrameTime, Keyframe>,
    limits: Option<ScalarLimits>,
    neutral_value: f64,
    node: Weak<Node>,
    bounds: Arc<dyn TimelineBounds>,
    store: Option<Arc<dyn PaintDeviceFrameStore>>,
    have_broken_frame_time_bug: bool,
}

impl KeyframeChannel {
    /// An empty channel on the node reached through `node`.
    ///
    /// `store` must be given for raster channels; scalar channels
    /// ignore it.
    pub fn new(
        id: ChannelId,
        node: Weak<Node>,
        bounds: Arc<dyn TimelineBounds>,
        store: Option<Arc<dyn PaintDeviceFrameStore>>,
    ) -> Self {
        Self {
            id,
            keys: BTreeMap::new(),
            limits: id.default_limits(),
            neutral_value: id.neutral_value(),
            node,
            bounds,
            store,
            have_broken_frame_time_bug: false,
        }
    }

    /// The channel's identity.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Current scalar value bounds, if any.
    pub fn limits(&self) -> Option<ScalarLimits> {
        self.limits
    }

    /// Replace the scalar value bounds. Affects future writes only.
    pub fn set_limits(&mut self, limits: Option<ScalarLimits>) {
        self.limits = limits;
    }

    // ---- plain lookups ------------------------------------------------

    /// The keyframe stored exactly at `time`.
    pub fn keyframe_at(&self, time: FrameTime) -> Option<&Keyframe> {
        self.keys.get(&time)
    }

    /// Time of the keyframe governing `time`: the latest non-repeat
    /// keyframe at or before it.
    pub fn active_keyframe_time(&self, time: FrameTime) -> Option<FrameTime> {
        self.keys
            .range(..=time)
            .rev()
            .find(|(_, key)| !key.is_repeat())
            .map(|(&t, _)| t)
    }

    /// The governing keyframe and its time.
    pub fn active_keyframe_at(&self, time: FrameTime) -> Option<(FrameTime, &Keyframe)> {
        let t = self.active_keyframe_time(time)?;
        self.keys.get(&t).map(|key| (t, key))
    }

    /// The repeat instance covering `time`, if the latest entry at or
    /// before `time` is a repeat.
    pub fn active_repeat_at(&self, time: FrameTime) -> Option<(FrameTime, Arc<AnimationCycle>)> {
        let (&t, key) = self.keys.range(..=time).next_back()?;
        key.as_repeat().map(|repeat| (t, repeat.cycle.clone()))
    }

    /// Time of the first non-repeat keyframe strictly after `time`.
    pub fn next_keyframe_time(&self, time: FrameTime) -> Option<FrameTime> {
        self.keys
            .range((Bound::Excluded(time), Bound::Unbounded))
            .find(|(_, key)| !key.is_repeat())
            .map(|(&t, _)| t)
    }

    /// Time of the last non-repeat keyframe strictly before `time`.
    pub fn previous_keyframe_time(&self, time: FrameTime) -> Option<FrameTime> {
        self.keys
            .range(..time)
            .rev()
            .find(|(_, key)| !key.is_repeat())
            .map(|(&t, _)| t)
    }

    /// Time of the first entry of any kind strictly after `time`.
    pub fn next_item_time(&self, time: FrameTime) -> Option<FrameTime> {
        self.keys
            .range((Bound::Excluded(time), Bound::Unbounded))
            .next()
            .map(|(&t, _)| t)
    }

    /// Time of the latest entry of any kind at or before `time`.
    pub fn active_item_time(&self, time: FrameTime) -> Option<FrameTime> {
        self.keys.range(..=time).next_back().map(|(&t, _)| t)
    }

    /// Time of the earliest non-repeat keyframe.
    pub fn first_keyframe_time(&self) -> Option<FrameTime> {
        self.keys
            .iter()
            .find(|(_, key)| !key.is_repeat())
            .map(|(&t, _)| t)
    }

    /// Time of the latest non-repeat keyframe.
    pub fn last_keyframe_time(&self) -> Option<FrameTime> {
        self.keys
            .iter()
            .rev()
            .find(|(_, key)| !key.is_repeat())
            .map(|(&t, _)| t)
    }

    /// Number of non-repeat keyframes.
    pub fn keyframe_count(&self) -> usize {
        self.keys.values().filter(|key| !key.is_repeat()).count()
    }

    /// Times of all entries, keyframes and repeats alike.
    pub fn all_keyframe_times(&self) -> Vec<FrameTime> {
        self.keys.keys().copied().collect()
    }

    /// Entries whose time lies inside `span`, in increasing order.
    pub fn items_within(&self, span: TimeSpan) -> impl Iterator<Item = (FrameTime, &Keyframe)> {
        let bounds = match span {
            TimeSpan::Empty => (Bound::Included(0), Bound::Excluded(0)),
            TimeSpan::Finite { start, end } => (Bound::Included(start), Bound::Included(end)),
            TimeSpan::Infinite { start } => (Bound::Included(start), Bound::Unbounded),
        };
        self.keys.range(bounds).map(|(&t, key)| (t, key))
    }

    /// Time of the keyframe whose content is displayed at `time`,
    /// resolving through an active repeat to its source keyframe.
    pub fn visible_keyframe_time_at(&self, time: FrameTime) -> Option<FrameTime> {
        match self.active_repeat_at(time) {
            Some((repeat_start, cycle)) => {
                self.active_keyframe_time(cycle.original_time_for(repeat_start, time))
            }
            None => self.active_keyframe_time(time),
        }
    }

    /// The contiguous run of frames governed by the same entry as
    /// `time`.
    pub fn active_keyframe_range(&self, time: FrameTime) -> TimeSpan {
        let start = self.active_item_time(time).unwrap_or(0);
        match self.next_item_time(time) {
            Some(next) => TimeSpan::finite(start, next - 1),
            None => TimeSpan::infinite_from(start),
        }
    }

    // ---- derived frame queries ----------------------------------------

    /// Frames whose displayed content may change when the keyframe
    /// governing `time` changes. For raster channels this includes the
    /// runs of every other keyframe sharing the same frame handle.
    pub fn affected_frames(&self, time: FrameTime) -> FrameSet {
        if let Some((repeat_start, cycle)) = self.active_repeat_at(time) {
            return self.affected_frames(cycle.original_time_for(repeat_start, time));
        }

        let start = self.active_keyframe_time(time).unwrap_or(0);
        let mut set = if self.id.is_raster() {
            let mut set = self.item_run(start);
            let frame = self
                .keys
                .get(&start)
                .and_then(Keyframe::as_raster)
                .map(|raster| raster.frame_id);
            if let Some(frame) = frame {
                for (&t, key) in &self.keys {
                    if t != start
                        && key
                            .as_raster()
                            .is_some_and(|raster| raster.frame_id == frame)
                    {
                        set |= self.item_run(t);
                    }
                }
            }
            set
        } else {
            // Interpolation makes a scalar key bleed into both
            // neighboring segments.
            let lower = match self.active_keyframe_time(time) {
                Some(active) => self.previous_keyframe_time(active).unwrap_or(0),
                None => 0,
            };
            match self.next_keyframe_time(time) {
                Some(next) => FrameSet::between(lower, next),
                None => FrameSet::infinite_from(lower),
            }
        };

        for cycle in self.cycles_over(start) {
            set |= cycle.instances_within(self, start, None);
        }
        set
    }

    /// Frames guaranteed to display the same content as `time`,
    /// optionally restricted to `range`.
    ///
    /// With a bounded `range` the result is exact; unbounded queries
    /// over-approximate the tails of unbounded repeats.
    pub fn identical_frames(&self, time: FrameTime, range: Option<TimeSpan>) -> FrameSet {
        if let Some((repeat_start, cycle)) = self.active_repeat_at(time) {
            return self.identical_frames(cycle.original_time_for(repeat_start, time), range);
        }

        if let Some(active) = self.active_keyframe_time(time)
            && let Some(scalar) = self.keys.get(&active).and_then(Keyframe::as_scalar)
            && scalar.interpolation != Interpolation::Constant
            && self.next_keyframe_time(active).is_some()
        {
            // Every interpolated frame is unique.
            let mut set = FrameSet::between(time, time);
            if let Some(range) = range {
                set &= FrameSet::from_span(range);
            }
            return set;
        }

        let start = self.active_keyframe_time(time).unwrap_or(0);
        let mut set = match self.next_item_time(time) {
            Some(next) => FrameSet::between(start, next - 1),
            None => FrameSet::infinite_from(start),
        };
        for cycle in self.cycles_over(start) {
            set |= cycle.instances_within(self, start, range);
        }
        if let Some(range) = range {
            set &= FrameSet::from_span(range);
        }
        set
    }

    /// Whether `t1` and `t2` are guaranteed to display the same content.
    pub fn are_frames_identical(&self, t1: FrameTime, t2: FrameTime) -> bool {
        let range = TimeSpan::finite(0, t1.max(t2));
        self.identical_frames(t1, Some(range)).contains(t2)
    }

    /// Whether a change to the keyframe governing `changed` can alter
    /// the content displayed at `target`.
    pub fn is_frame_affected_by(&self, target: FrameTime, changed: FrameTime) -> bool {
        self.affected_frames(changed).contains(target)
    }

    /// The run governed by the entry at `key_time`, up to the next
    /// entry of any kind.
    fn item_run(&self, key_time: FrameTime) -> FrameSet {
        match self.next_item_time(key_time) {
            Some(next) => FrameSet::between(key_time, next - 1),
            None => FrameSet::infinite_from(key_time),
        }
    }

    /// Distinct cycles whose source range contains `time`.
    fn cycles_over(&self, time: FrameTime) -> Vec<Arc<AnimationCycle>> {
        let mut out: Vec<Arc<AnimationCycle>> = Vec::new();
        for key in self.keys.values() {
            if let KeyframeValue::Repeat(repeat) = &key.value
                && repeat.cycle.original_range().contains(time)
                && !out.iter().any(|cycle| Arc::ptr_eq(cycle, &repeat.cycle))
            {
                out.push(repeat.cycle.clone());
            }
        }
        out
    }

    // ---- scalar evaluation --------------------------------------------

    /// Evaluate a scalar channel at `time`. `None` on raster channels
    /// and on channels without any keyframe.
    pub fn value_at(&self, time: FrameTime) -> Option<f64> {
        if self.id.is_raster() {
            return None;
        }
        let time = match self.active_repeat_at(time) {
            Some((repeat_start, cycle)) => cycle.original_time_for(repeat_start, time),
            None => time,
        };

        let t0 = match self.active_keyframe_time(time) {
            Some(t0) => t0,
            None => {
                // Before the first key the first value holds backwards.
                let first = self.first_keyframe_time()?;
                return self.keys.get(&first)?.as_scalar().map(|s| s.value);
            }
        };
        let k0 = self.keys.get(&t0)?.as_scalar()?;
        match self.next_keyframe_time(t0) {
            None => Some(k0.value),
            Some(t1) => {
                let k1 = self.keys.get(&t1)?.as_scalar()?;
                Some(interpolated_value(t0, k0, t1, k1, time))
            }
        }
    }

    // ---- edits --------------------------------------------------------

    /// Put `keyframe` at `time`, displacing any occupant. Scalar values
    /// are clamped into the channel limits.
    pub fn insert_keyframe(&mut self, time: FrameTime, keyframe: Keyframe) -> ChannelEdit {
        let keyframe = self.clamped(keyframe);
        self.apply_edit(vec![(time, Some(keyframe))])
    }

    /// Create a fresh keyframe at `time`: a blank raster frame from the
    /// store, or a scalar key holding the channel's current value there.
    pub fn add_keyframe(&mut self, time: FrameTime) -> ChannelEdit {
        let keyframe = self.blank_keyframe(time);
        self.apply_edit(vec![(time, Some(keyframe))])
    }

    /// Remove the keyframe at `time`. `None` when no keyframe is there.
    ///
    /// On a raster channel frame 0 always keeps content: removing its
    /// keyframe replaces it with a fresh blank one instead.
    pub fn remove_keyframe(&mut self, time: FrameTime) -> Option<ChannelEdit> {
        if !self.keys.contains_key(&time) {
            return None;
        }
        if self.id.is_raster() && time == 0 {
            let blank = self.blank_keyframe(0);
            return Some(self.apply_edit(vec![(0, Some(blank))]));
        }
        Some(self.apply_edit(vec![(time, None)]))
    }

    /// Move the keyframe at `from` to `to`, displacing any occupant.
    /// `None` when `from` is vacant or the move is a no-op.
    pub fn move_keyframe(&mut self, from: FrameTime, to: FrameTime) -> Option<ChannelEdit> {
        if from == to {
            return None;
        }
        let key = self.keys.get(&from)?.clone();
        let vacated = if self.id.is_raster() && from == 0 {
            Some(self.blank_keyframe(0))
        } else {
            None
        };
        Some(self.apply_edit(vec![(from, vacated), (to, Some(key))]))
    }

    /// Duplicate the keyframe at `from` onto `to`. Raster content is
    /// copied through the store so the two frames stay independent.
    pub fn copy_keyframe(&mut self, from: FrameTime, to: FrameTime) -> Option<ChannelEdit> {
        let key = self.keys.get(&from)?;
        let copy = self.duplicate(key);
        Some(self.apply_edit(vec![(to, Some(copy))]))
    }

    /// Exchange the entries at `lhs` and `rhs`. Either slot may be
    /// vacant; both vacant is a no-op.
    pub fn swap_keyframes(&mut self, lhs: FrameTime, rhs: FrameTime) -> Option<ChannelEdit> {
        if lhs == rhs {
            return None;
        }
        let a = self.keys.get(&lhs).cloned();
        let b = self.keys.get(&rhs).cloned();
        if a.is_none() && b.is_none() {
            return None;
        }
        Some(self.apply_edit(vec![(lhs, b), (rhs, a)]))
    }

    /// Exchange the entries at `time` between two channels, producing
    /// one edit per channel.
    pub fn swap_with(
        &mut self,
        other: &mut KeyframeChannel,
        time: FrameTime,
    ) -> (ChannelEdit, ChannelEdit) {
        let mine = self.keys.get(&time).cloned();
        let theirs = other.keys.get(&time).cloned();
        (
            self.apply_edit(vec![(time, theirs)]),
            other.apply_edit(vec![(time, mine)]),
        )
    }

    /// Set the value of the scalar keyframe at `time`, clamped into the
    /// channel limits. `None` when the slot is vacant or not scalar.
    pub fn set_scalar_value(&mut self, time: FrameTime, value: f64) -> Option<ChannelEdit> {
        let clamped = self.clamp_scalar(value);
        let mut key = self.keys.get(&time)?.clone();
        let KeyframeValue::Scalar(scalar) = &mut key.value else {
            return None;
        };
        scalar.value = clamped;
        Some(self.apply_edit(vec![(time, Some(key))]))
    }

    /// Set the color label of the entry at `time`.
    pub fn set_color_label(&mut self, time: FrameTime, label: u32) -> Option<ChannelEdit> {
        let mut key = self.keys.get(&time)?.clone();
        key.color_label = label;
        Some(self.apply_edit(vec![(time, Some(key))]))
    }

    /// Undo `edit` by restoring every touched slot's previous occupant,
    /// newest slot first.
    pub fn revert(&mut self, edit: &ChannelEdit) {
        debug_assert_eq!(edit.channel, self.id);
        let slots: Vec<_> = edit
            .slots
            .iter()
            .rev()
            .map(|slot| (slot.time, slot.before.clone()))
            .collect();
        self.apply_edit(slots);
    }

    /// Redo `edit` by restoring every touched slot's new occupant.
    pub fn reapply(&mut self, edit: &ChannelEdit) {
        debug_assert_eq!(edit.channel, self.id);
        let slots: Vec<_> = edit
            .slots
            .iter()
            .map(|slot| (slot.time, slot.after.clone()))
            .collect();
        self.apply_edit(slots);
    }

    /// Release an edit that can no longer be reverted: raster frames it
    /// displaced and that the channel no longer references are deleted
    /// from the store.
    pub fn discard(&self, edit: ChannelEdit) {
        let Some(store) = &self.store else { return };
        for slot in edit.slots {
            let Some(KeyframeValue::Raster(raster)) = slot.before.map(|key| key.value) else {
                continue;
            };
            let still_used = self.keys.values().any(|key| {
                key.as_raster()
                    .is_some_and(|current| current.frame_id == raster.frame_id)
            });
            if !still_used {
                store.delete_frame(raster.frame_id);
            }
        }
    }

    fn apply_edit(&mut self, slots: Vec<(FrameTime, Option<Keyframe>)>) -> ChannelEdit {
        let mut recorded = Vec::with_capacity(slots.len());
        for (time, after) in slots {
            let before = self.set_raw(time, after.clone());
            recorded.push(KeyframeSlot {
                time,
                before,
                after,
            });
        }
        let edit = ChannelEdit {
            channel: self.id,
            slots: recorded,
        };
        self.request_update(&edit);
        edit
    }

    /// Insert an entry while loading a record: no edit is produced and
    /// no update is requested.
    pub(crate) fn insert_loaded(&mut self, time: FrameTime, key: Keyframe) {
        self.set_raw(time, Some(key));
    }

    /// The one place the key map changes. Keeps cycle registries in
    /// step with repeat entries.
    fn set_raw(&mut self, time: FrameTime, value: Option<Keyframe>) -> Option<Keyframe> {
        let previous = match value {
            Some(key) => self.keys.insert(time, key),
            None => self.keys.remove(&time),
        };
        // Detach before attach: replacing a repeat with a repeat of the
        // same cycle must leave the time registered.
        if let Some(KeyframeValue::Repeat(repeat)) = previous.as_ref().map(|key| &key.value) {
            repeat.cycle.remove_repeat(time);
        }
        if let Some(KeyframeValue::Repeat(repeat)) = self.keys.get(&time).map(|key| &key.value) {
            repeat.cycle.add_repeat(time);
        }
        previous
    }

    fn blank_keyframe(&self, time: FrameTime) -> Keyframe {
        if self.id.is_raster() {
            let frame_id = match &self.store {
                Some(store) => store.create_frame(None),
                None => FrameId(0),
            };
            Keyframe::raster(frame_id)
        } else {
            let value = self.value_at(time).unwrap_or(self.neutral_value);
            Keyframe::scalar(ScalarKeyframe::new(value))
        }
    }

    fn duplicate(&self, key: &Keyframe) -> Keyframe {
        match (&key.value, &self.store) {
            (KeyframeValue::Raster(raster), Some(store)) => Keyframe {
                color_label: key.color_label,
                value: KeyframeValue::Raster(RasterKeyframe {
                    frame_id: store.create_frame(Some(raster.frame_id)),
                }),
            },
            _ => key.clone(),
        }
    }

    fn clamped(&self, mut key: Keyframe) -> Keyframe {
        if let KeyframeValue::Scalar(scalar) = &mut key.value {
            scalar.value = self.clamp_scalar(scalar.value);
        }
        key
    }

    fn clamp_scalar(&self, value: f64) -> f64 {
        match self.limits {
            Some(limits) => limits.clamp(value),
            None => value,
        }
    }

    // ---- update plumbing ----------------------------------------------

    /// Forward the consequences of an edit to the owning node: the
    /// affected frames are invalidated, and the node is marked dirty
    /// when the playhead sits inside them.
    fn request_update(&self, edit: &ChannelEdit) {
        let mut affected = FrameSet::empty();
        let mut rect: Option<Rect> = None;
        for slot in &edit.slots {
            affected |= self.affected_frames(slot.time);
            for key in slot.before.iter().chain(slot.after.iter()) {
                let r = self.key_rect(key);
                rect = Some(match rect {
                    Some(acc) => acc.union(r),
                    None => r,
                });
            }
        }
        let rect = rect.unwrap_or_else(|| self.bounds.bounds());

        if let Some(node) = self.node.upgrade() {
            node.invalidate_frames(&affected, rect);
            if affected.contains(self.bounds.current_time()) {
                node.set_dirty(&[rect]);
            }
        }
    }

    fn key_rect(&self, key: &Keyframe) -> Rect {
        match (&key.value, &self.store) {
            (KeyframeValue::Raster(raster), Some(store)) => store.frame_bounds(raster.frame_id),
            _ => self.bounds.bounds(),
        }
    }

    // ---- visible-frame stepping ---------------------------------------

    /// Next frame at which the displayed content differs from `time`,
    /// stepping through repeat instances segment by segment.
    pub fn next_visible_frame(&self, time: FrameTime) -> Option<FrameTime> {
        if let Some((repeat_start, cycle)) = self.active_repeat_at(time)
            && let Some(next) = cycle.next_visible_frame(self, repeat_start, time)
        {
            return Some(next);
        }
        self.next_item_time(time)
    }

    /// Latest frame before `time` at which the displayed content
    /// differs, `None` when content is uniform back to frame 0.
    pub fn previous_visible_frame(&self, time: FrameTime) -> Option<FrameTime> {
        if let Some((repeat_start, cycle)) = self.active_repeat_at(time) {
            if let Some(previous) = cycle.previous_visible_frame(self, repeat_start, time) {
                return Some(previous);
            }
            return (repeat_start > 0).then(|| repeat_start - 1);
        }
        match self.active_item_time(time) {
            Some(start) if start > 0 => Some(start - 1),
            _ => None,
        }
    }

    // ---- cloning and hashing ------------------------------------------

    /// Deep-copy the channel for a duplicated node. Raster frames are
    /// copied through the new store; cycles are recreated so the clone's
    /// repeats never feed back into the source channel.
    pub fn clone_for(
        &self,
        node: Weak<Node>,
        bounds: Arc<dyn TimelineBounds>,
        store: Option<Arc<dyn PaintDeviceFrameStore>>,
    ) -> Self {
        let mut cycle_map: Vec<(*const AnimationCycle, Arc<AnimationCycle>)> = Vec::new();
        let mut keys = BTreeMap::new();

        for (&time, key) in &self.keys {
            let value = match &key.value {
                KeyframeValue::Raster(raster) => {
                    let frame_id = match &store {
                        Some(s) => s.create_frame(Some(raster.frame_id)),
                        None => raster.frame_id,
                    };
                    KeyframeValue::Raster(RasterKeyframe { frame_id })
                }
                KeyframeValue::Scalar(scalar) => KeyframeValue::Scalar(*scalar),
                KeyframeValue::Repeat(repeat) => {
                    let ptr = Arc::as_ptr(&repeat.cycle);
                    let cycle = match cycle_map.iter().find(|(p, _)| *p == ptr) {
                        Some((_, cycle)) => cycle.clone(),
                        None => {
                            let range = repeat.cycle.original_range();
                            let fresh = Arc::new(AnimationCycle::new(
                                range.start().unwrap_or(0),
                                range.end().unwrap_or(0),
                            ));
                            cycle_map.push((ptr, fresh.clone()));
                            fresh
                        }
                    };
                    cycle.add_repeat(time);
                    KeyframeValue::Repeat(crate::channel::keyframe::RepeatKeyframe { cycle })
                }
            };
            keys.insert(
                time,
                Keyframe {
                    color_label: key.color_label,
                    value,
                },
            );
        }

        Self {
            id: self.id,
            keys,
            limits: self.limits,
            neutral_value: self.neutral_value,
            node,
            bounds,
            store,
            have_broken_frame_time_bug: false,
        }
    }

    /// Order-sensitive digest of the channel's entries, usable as a
    /// cache key by external frame schedulers.
    pub fn frames_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::hash::DefaultHasher::new();
        for (time, key) in &self.keys {
            time.hash(&mut hasher);
            key.color_label.hash(&mut hasher);
            match &key.value {
                KeyframeValue::Raster(raster) => {
                    0u8.hash(&mut hasher);
                    raster.frame_id.0.hash(&mut hasher);
                }
                KeyframeValue::Scalar(scalar) => {
                    1u8.hash(&mut hasher);
                    scalar.value.to_bits().hash(&mut hasher);
                    (scalar.interpolation as u8).hash(&mut hasher);
                    scalar.left_tangent.x.to_bits().hash(&mut hasher);
                    scalar.left_tangent.y.to_bits().hash(&mut hasher);
                    scalar.right_tangent.x.to_bits().hash(&mut hasher);
                    scalar.right_tangent.y.to_bits().hash(&mut hasher);
                }
                KeyframeValue::Repeat(repeat) => {
                    2u8.hash(&mut hasher);
                    repeat.cycle.original_range().hash(&mut hasher);
                }
            }
        }
        hasher.finish()
    }

    // ---- legacy loading -----------------------------------------------

    /// Map a stored keyframe time from documents written with the
    /// negative-time bug: negative times clamp to 0, and once the bug
    /// has been seen *every* later time slides right past occupied
    /// slots, so no stored keyframe is silently dropped or overwritten.
    pub fn workaround_broken_frame_time_bug(&mut self, time: FrameTime) -> FrameTime {
        let mut time = time;
        if time < 0 {
            if !self.have_broken_frame_time_bug {
                tracing::warn!(
                    channel = self.id.name(),
                    time,
                    "negative keyframe time in stored data, remapping"
                );
                self.have_broken_frame_time_bug = true;
            }
            time = 0;
        }
        if self.have_broken_frame_time_bug {
            while self.keys.contains_key(&time) {
                time += 1;
            }
        }
        time
    }
}

#[cfg(test)]
#[path = "../../tests/unit/channel/channel.rs"]
mod tests;
