use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::channel::channel::KeyframeChannel;
use crate::foundation::core::FrameTime;
use crate::interval::set::FrameSet;
use crate::interval::span::TimeSpan;

/// A definition of "replay the source range of keyframes periodically".
///
/// One cycle is shared by reference among all of its repeat instances;
/// the cycle itself holds only the repeat *times*, never the repeats, so
/// dropping the last repeat frees the cycle. Mutation of the registry
/// follows the same single-writer rule as the owning channel's key map.
#[derive(Debug)]
pub struct AnimationCycle {
    original_range: TimeSpan,
    repeats: RwLock<BTreeSet<FrameTime>>,
}

impl AnimationCycle {
    /// A cycle replaying the source keyframes in
    /// `[first_source, last_source]`.
    pub fn new(first_source: FrameTime, last_source: FrameTime) -> Self {
        debug_assert!(first_source <= last_source);
        Self {
            original_range: TimeSpan::finite(first_source, last_source),
            repeats: RwLock::new(BTreeSet::new()),
        }
    }

    /// The replayed source range.
    pub fn original_range(&self) -> TimeSpan {
        self.original_range
    }

    /// Length of one repetition period in frames.
    pub fn duration(&self) -> i64 {
        self.original_range.duration().unwrap_or(0)
    }

    /// Register a repeat instance starting at `time`.
    pub fn add_repeat(&self, time: FrameTime) {
        write_lock(&self.repeats).insert(time);
    }

    /// Unregister the repeat instance starting at `time`.
    pub fn remove_repeat(&self, time: FrameTime) {
        write_lock(&self.repeats).remove(&time);
    }

    /// Start times of all registered repeat instances, increasing.
    pub fn repeats(&self) -> Vec<FrameTime> {
        read_lock(&self.repeats).iter().copied().collect()
    }

    /// Whether no repeat instance references this cycle anymore.
    pub fn is_orphaned(&self) -> bool {
        read_lock(&self.repeats).is_empty()
    }

    /// Map a time inside a repeat instance back to the source range.
    ///
    /// `repeat_start` is the instance's own start; `time` must lie at or
    /// after it.
    pub fn original_time_for(&self, repeat_start: FrameTime, time: FrameTime) -> FrameTime {
        debug_assert!(time >= repeat_start);
        let Some(source_start) = self.original_range.start() else {
            return time;
        };
        let duration = self.duration();
        if duration <= 0 {
            return source_start;
        }
        source_start + (time - repeat_start).rem_euclid(duration)
    }

    /// Earliest repeat-instance time at or after any repeat's start that
    /// replays `original_time`, or `None` when the time occurs too late
    /// in the cycle to be reached before every repeat instance ends.
    pub fn first_instance_of(
        &self,
        channel: &KeyframeChannel,
        original_time: FrameTime,
    ) -> Option<FrameTime> {
        let source_start = self.original_range.start()?;
        if !self.original_range.contains(original_time) {
            return None;
        }
        let offset = original_time - source_start;

        for repeat_start in self.repeats() {
            let candidate = repeat_start + offset;
            match channel.next_item_time(repeat_start) {
                Some(end) if candidate >= end => continue,
                _ => return Some(candidate),
            }
        }
        None
    }

    /// Next frame inside the repeat starting at `repeat_start` whose
    /// displayed content differs from `time`, stepping to the end of
    /// the governing source segment. `None` at the repeat boundary.
    pub fn next_visible_frame(
        &self,
        channel: &KeyframeChannel,
        repeat_start: FrameTime,
        time: FrameTime,
    ) -> Option<FrameTime> {
        let source_end = self.original_range.end()?;
        let original = self.original_time_for(repeat_start, time);
        let segment_end = channel
            .next_keyframe_time(original)
            .map(|next| next - 1)
            .unwrap_or(source_end)
            .min(source_end);
        let candidate = time + (segment_end - original) + 1;
        match channel.next_item_time(repeat_start) {
            Some(next) if candidate >= next => None,
            _ => Some(candidate),
        }
    }

    /// Previous frame inside the repeat starting at `repeat_start`
    /// whose displayed content differs from `time`. `None` at the
    /// repeat boundary.
    pub fn previous_visible_frame(
        &self,
        channel: &KeyframeChannel,
        repeat_start: FrameTime,
        time: FrameTime,
    ) -> Option<FrameTime> {
        let source_start = self.original_range.start()?;
        let original = self.original_time_for(repeat_start, time);
        let segment_start = channel
            .active_keyframe_time(original)
            .unwrap_or(source_start)
            .max(source_start);
        let candidate = time - (original - segment_start) - 1;
        (candidate >= repeat_start).then_some(candidate)
    }

    /// The set of repeat-instance frames whose content equals the source
    /// keyframe governing `original_time`, optionally bounded by `range`.
    ///
    /// Repetitions falling entirely before the range are skipped in one
    /// ceiling division rather than a loop. When a repeat window is
    /// unbounded and no range is given, the tail is over-approximated by
    /// an infinite span; bounded queries are exact.
    pub fn instances_within(
        &self,
        channel: &KeyframeChannel,
        original_time: FrameTime,
        range: Option<TimeSpan>,
    ) -> FrameSet {
        let mut result = FrameSet::empty();

        let Some(source_start) = self.original_range.start() else {
            return result;
        };
        let Some(source_end) = self.original_range.end() else {
            return result;
        };
        let duration = self.duration();
        if duration <= 0 {
            return result;
        }
        if let Some(range) = range
            && range.is_empty()
        {
            return result;
        }

        // The governing source segment: from its key to the frame before
        // the next source key, clipped to the source range.
        let segment_start = channel
            .active_keyframe_time(original_time)
            .unwrap_or(source_start)
            .max(source_start);
        let segment_end = channel
            .next_keyframe_time(segment_start)
            .map(|next| next - 1)
            .unwrap_or(source_end)
            .min(source_end);
        if segment_end < segment_start {
            return result;
        }
        let offset = segment_start - source_start;
        let segment_len = segment_end - segment_start + 1;

        let (range_start, range_end) = match range {
            Some(TimeSpan::Finite { start, end }) => (Some(start), Some(end)),
            Some(TimeSpan::Infinite { start }) => (Some(start), None),
            _ => (None, None),
        };

        for repeat_start in self.repeats() {
            let window_end = channel.next_item_time(repeat_start).map(|next| next - 1);

            let base = repeat_start + offset;
            // Skip whole periods that end before the range begins.
            let mut n = match range_start {
                Some(rs) if rs > base + segment_len - 1 => {
                    (rs - (base + segment_len - 1) + duration - 1) / duration
                }
                _ => 0,
            };

            loop {
                let instance_start = base + n * duration;
                if let Some(we) = window_end
                    && instance_start > we
                {
                    break;
                }
                if let Some(re) = range_end
                    && instance_start > re
                {
                    break;
                }
                if window_end.is_none() && range_end.is_none() {
                    // Unbounded window, unbounded query: over-approximate.
                    result |= FrameSet::infinite_from(instance_start);
                    break;
                }

                let mut instance_end = instance_start + segment_len - 1;
                if let Some(we) = window_end {
                    instance_end = instance_end.min(we);
                }
                if let Some(re) = range_end {
                    instance_end = instance_end.min(re);
                }
                let clipped_start = match range_start {
                    Some(rs) => instance_start.max(rs),
                    None => instance_start,
                };
                if clipped_start <= instance_end {
                    result |= FrameSet::between(clipped_start, instance_end);
                }
                n += 1;
            }
        }

        result
    }
}


fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}
