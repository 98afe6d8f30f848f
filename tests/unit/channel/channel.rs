use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use super::*;

struct TestBounds(AtomicI64);

impl TimelineBounds for TestBounds {
    fn current_time(&self) -> FrameTime {
        self.0.load(Ordering::Relaxed)
    }

    fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, 512.0, 512.0)
    }
}

#[derive(Default)]
struct TestStore {
    next: AtomicU64,
    deleted: Mutex<Vec<FrameId>>,
}

impl PaintDeviceFrameStore for TestStore {
    fn create_frame(&self, _copy_from: Option<FrameId>) -> FrameId {
        FrameId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn delete_frame(&self, frame: FrameId) {
        self.deleted.lock().unwrap().push(frame);
    }

    fn upload_frame(&self, _from: FrameId, _to: FrameId) {}

    fn write_frame_to_device(&self, _frame: FrameId) {}

    fn frame_bounds(&self, _frame: FrameId) -> Rect {
        Rect::new(0.0, 0.0, 64.0, 64.0)
    }
}

fn scalar_channel(id: ChannelId) -> KeyframeChannel {
    KeyframeChannel::new(
        id,
        Weak::new(),
        Arc::new(TestBounds(AtomicI64::new(0))),
        None,
    )
}

fn raster_channel() -> (KeyframeChannel, Arc<TestStore>) {
    let store = Arc::new(TestStore::default());
    let channel = KeyframeChannel::new(
        ChannelId::Content,
        Weak::new(),
        Arc::new(TestBounds(AtomicI64::new(0))),
        Some(store.clone()),
    );
    (channel, store)
}

fn scalar_key(value: f64, interpolation: Interpolation) -> Keyframe {
    let mut key = ScalarKeyframe::new(value);
    key.interpolation = interpolation;
    Keyframe::scalar(key)
}

#[test]
fn navigation_over_plain_keys() {
    let mut channel = scalar_channel(ChannelId::PositionX);
    assert_eq!(channel.active_keyframe_time(100), None);
    assert_eq!(channel.keyframe_count(), 0);

    channel.insert_keyframe(0, scalar_key(1.0, Interpolation::Constant));
    channel.insert_keyframe(10, scalar_key(2.0, Interpolation::Constant));

    assert_eq!(channel.active_keyframe_time(5), Some(0));
    assert_eq!(channel.active_keyframe_time(10), Some(10));
    assert_eq!(channel.next_keyframe_time(0), Some(10));
    assert_eq!(channel.next_keyframe_time(10), None);
    assert_eq!(channel.previous_keyframe_time(10), Some(0));
    assert_eq!(channel.first_keyframe_time(), Some(0));
    assert_eq!(channel.last_keyframe_time(), Some(10));
    assert_eq!(channel.keyframe_count(), 2);
    assert_eq!(channel.active_keyframe_range(3), TimeSpan::finite(0, 9));
    assert_eq!(channel.active_keyframe_range(10), TimeSpan::infinite_from(10));
}

#[test]
fn linear_interpolation_between_keys() {
    let mut channel = scalar_channel(ChannelId::Opacity);
    channel.insert_keyframe(0, scalar_key(0.0, Interpolation::Linear));
    channel.insert_keyframe(10, scalar_key(1.0, Interpolation::Linear));

    assert_eq!(channel.value_at(0), Some(0.0));
    assert_eq!(channel.value_at(5), Some(0.5));
    assert_eq!(channel.value_at(10), Some(1.0));
    // The last value holds forward, the first holds backward.
    assert_eq!(channel.value_at(25), Some(1.0));

    let mut before = scalar_channel(ChannelId::Opacity);
    before.insert_keyframe(8, scalar_key(0.7, Interpolation::Linear));
    assert_eq!(before.value_at(2), Some(0.7));
}

#[test]
fn interpolated_scalar_frames_are_unique() {
    let mut channel = scalar_channel(ChannelId::Opacity);
    channel.insert_keyframe(0, scalar_key(0.0, Interpolation::Linear));
    channel.insert_keyframe(10, scalar_key(1.0, Interpolation::Linear));

    assert_eq!(channel.affected_frames(5), FrameSet::between(0, 10));
    assert_eq!(channel.identical_frames(5, None), FrameSet::between(5, 5));
    assert!(!channel.are_frames_identical(5, 6));
    assert!(channel.is_frame_affected_by(10, 5));
    assert!(!channel.is_frame_affected_by(11, 5));
}

#[test]
fn constant_scalar_frames_share_a_run() {
    let mut channel = scalar_channel(ChannelId::Opacity);
    channel.insert_keyframe(0, scalar_key(0.4, Interpolation::Constant));
    channel.insert_keyframe(10, scalar_key(0.8, Interpolation::Constant));

    assert_eq!(channel.value_at(5), Some(0.4));
    assert_eq!(channel.value_at(10), Some(0.8));
    assert_eq!(channel.identical_frames(5, None), FrameSet::between(0, 9));
    assert!(channel.are_frames_identical(2, 7));
    assert!(!channel.are_frames_identical(2, 10));
}

#[test]
fn limits_clamp_writes_only() {
    let mut channel = scalar_channel(ChannelId::Opacity);
    channel.insert_keyframe(0, scalar_key(1.5, Interpolation::Constant));
    assert_eq!(channel.value_at(0), Some(1.0));

    channel.set_scalar_value(0, -0.5);
    assert_eq!(channel.value_at(0), Some(0.0));

    channel.set_limits(None);
    channel.set_scalar_value(0, 3.0);
    assert_eq!(channel.value_at(0), Some(3.0));
}

#[test]
fn raster_frame_zero_always_keeps_content() {
    let (mut channel, _store) = raster_channel();
    channel.add_keyframe(0);
    let original = channel.keyframe_at(0).unwrap().as_raster().unwrap().frame_id;

    assert!(channel.remove_keyframe(0).is_some());
    let replacement = channel.keyframe_at(0).unwrap().as_raster().unwrap().frame_id;
    assert_ne!(original, replacement);

    assert!(channel.remove_keyframe(33).is_none());
}

#[test]
fn moving_away_from_frame_zero_leaves_a_blank_key() {
    let (mut channel, _store) = raster_channel();
    channel.add_keyframe(0);
    let original = channel.keyframe_at(0).unwrap().as_raster().unwrap().frame_id;

    assert!(channel.move_keyframe(0, 7).is_some());
    assert_eq!(
        channel.keyframe_at(7).unwrap().as_raster().unwrap().frame_id,
        original
    );
    let blank = channel.keyframe_at(0).unwrap().as_raster().unwrap().frame_id;
    assert_ne!(blank, original);
}

#[test]
fn move_displaces_and_revert_restores() {
    let mut channel = scalar_channel(ChannelId::PositionX);
    channel.insert_keyframe(0, scalar_key(1.0, Interpolation::Constant));
    channel.insert_keyframe(5, scalar_key(2.0, Interpolation::Constant));

    let edit = channel.move_keyframe(0, 5).unwrap();
    assert_eq!(channel.keyframe_count(), 1);
    assert_eq!(channel.value_at(5), Some(1.0));

    channel.revert(&edit);
    assert_eq!(channel.keyframe_count(), 2);
    assert_eq!(channel.value_at(0), Some(1.0));
    assert_eq!(channel.value_at(5), Some(2.0));

    channel.reapply(&edit);
    assert_eq!(channel.keyframe_count(), 1);
    assert_eq!(channel.value_at(5), Some(1.0));

    assert!(channel.move_keyframe(3, 3).is_none());
    assert!(channel.move_keyframe(99, 3).is_none());
}

#[test]
fn swap_exchanges_occupants() {
    let mut channel = scalar_channel(ChannelId::PositionX);
    channel.insert_keyframe(0, scalar_key(1.0, Interpolation::Constant));
    channel.insert_keyframe(10, scalar_key(2.0, Interpolation::Constant));

    let edit = channel.swap_keyframes(0, 10).unwrap();
    assert_eq!(channel.value_at(0), Some(2.0));
    assert_eq!(channel.value_at(10), Some(1.0));

    channel.revert(&edit);
    assert_eq!(channel.value_at(0), Some(1.0));

    // A vacant side turns the swap into a move.
    let edit = channel.swap_keyframes(10, 20).unwrap();
    assert!(channel.keyframe_at(10).is_none());
    assert_eq!(channel.value_at(20), Some(2.0));
    channel.revert(&edit);

    assert!(channel.swap_keyframes(40, 41).is_none());
}

#[test]
fn copy_duplicates_raster_content() {
    let (mut channel, _store) = raster_channel();
    channel.add_keyframe(0);
    let original = channel.keyframe_at(0).unwrap().as_raster().unwrap().frame_id;

    assert!(channel.copy_keyframe(0, 8).is_some());
    let copy = channel.keyframe_at(8).unwrap().as_raster().unwrap().frame_id;
    assert_ne!(copy, original);
    assert!(channel.copy_keyframe(50, 8).is_none());
}

#[test]
fn swap_between_channels() {
    let mut a = scalar_channel(ChannelId::PositionX);
    let mut b = scalar_channel(ChannelId::PositionY);
    a.insert_keyframe(4, scalar_key(1.0, Interpolation::Constant));
    b.insert_keyframe(4, scalar_key(9.0, Interpolation::Constant));

    let (edit_a, edit_b) = a.swap_with(&mut b, 4);
    assert_eq!(a.value_at(4), Some(9.0));
    assert_eq!(b.value_at(4), Some(1.0));

    a.revert(&edit_a);
    b.revert(&edit_b);
    assert_eq!(a.value_at(4), Some(1.0));
    assert_eq!(b.value_at(4), Some(9.0));
}

fn repeated_raster_channel() -> (KeyframeChannel, Arc<AnimationCycle>) {
    let (mut channel, _store) = raster_channel();
    channel.add_keyframe(0);
    channel.add_keyframe(5);
    let cycle = Arc::new(AnimationCycle::new(0, 9));
    channel.insert_keyframe(20, Keyframe::repeat(cycle.clone()));
    (channel, cycle)
}

#[test]
fn repeats_resolve_to_their_source_keyframes() {
    let (channel, cycle) = repeated_raster_channel();

    let (repeat_start, active) = channel.active_repeat_at(25).unwrap();
    assert_eq!(repeat_start, 20);
    assert!(Arc::ptr_eq(&active, &cycle));
    assert_eq!(cycle.repeats(), vec![20]);

    assert_eq!(channel.visible_keyframe_time_at(27), Some(5));
    assert_eq!(channel.visible_keyframe_time_at(32), Some(0));
    assert_eq!(cycle.first_instance_of(&channel, 5), Some(25));
    assert_eq!(cycle.first_instance_of(&channel, 40), None);
}

#[test]
fn identical_frames_cover_repeat_instances() {
    let (channel, _cycle) = repeated_raster_channel();

    let range = TimeSpan::finite(0, 40);
    let expected = FrameSet::between(0, 4)
        | FrameSet::between(20, 24)
        | FrameSet::between(30, 34)
        | FrameSet::between(40, 40);
    assert_eq!(channel.identical_frames(2, Some(range)), expected);

    assert!(channel.are_frames_identical(2, 22));
    assert!(channel.are_frames_identical(2, 32));
    assert!(!channel.are_frames_identical(2, 27));
    assert!(channel.are_frames_identical(7, 27));
}

#[test]
fn affected_frames_recurse_through_repeats() {
    let (channel, _cycle) = repeated_raster_channel();

    // A change seen at frame 25 is a change to the source key at 5.
    let affected = channel.affected_frames(25);
    assert!(affected.contains(5));
    assert!(affected.contains(19));
    assert!(affected.contains(26));
    assert!(affected.contains(35));
    assert!(!affected.contains(3));
    assert!(!affected.contains(20));
}

#[test]
fn shared_raster_frames_are_invalidated_together() {
    let (mut channel, _store) = raster_channel();
    channel.add_keyframe(0);
    channel.add_keyframe(10);
    let shared = channel.keyframe_at(0).unwrap().as_raster().unwrap().frame_id;
    channel.insert_keyframe(20, Keyframe::raster(shared));

    // A change to the frame behind key 0 is visible at key 20 too.
    let affected = channel.affected_frames(3);
    assert!(affected.contains(0));
    assert!(affected.contains(25));
    assert!(!affected.contains(10));

    assert!(channel.is_frame_affected_by(20, 0));
    assert!(!channel.is_frame_affected_by(12, 0));
}

#[test]
fn visible_frame_stepping_through_a_repeat() {
    let (channel, _cycle) = repeated_raster_channel();

    // Plain region: the next change is the next item.
    assert_eq!(channel.next_visible_frame(0), Some(5));
    assert_eq!(channel.next_visible_frame(6), Some(20));

    // Inside the repeat, steps follow the source segment lengths.
    assert_eq!(channel.next_visible_frame(21), Some(25));
    assert_eq!(channel.next_visible_frame(25), Some(30));
    assert_eq!(channel.previous_visible_frame(25), Some(24));
    assert_eq!(channel.previous_visible_frame(20), Some(19));
    assert_eq!(channel.previous_visible_frame(0), None);
}

#[test]
fn removing_a_repeat_unregisters_it() {
    let (mut channel, cycle) = repeated_raster_channel();
    assert!(!cycle.is_orphaned());

    let edit = channel.remove_keyframe(20).unwrap();
    assert!(cycle.is_orphaned());

    channel.revert(&edit);
    assert_eq!(cycle.repeats(), vec![20]);
}

#[test]
fn items_within_respects_span_bounds() {
    let mut channel = scalar_channel(ChannelId::PositionX);
    for time in [0, 5, 10] {
        channel.insert_keyframe(time, scalar_key(time as f64, Interpolation::Constant));
    }

    let times: Vec<_> = channel
        .items_within(TimeSpan::finite(1, 10))
        .map(|(t, _)| t)
        .collect();
    assert_eq!(times, vec![5, 10]);

    assert_eq!(channel.items_within(TimeSpan::Empty).count(), 0);
    let tail: Vec<_> = channel
        .items_within(TimeSpan::infinite_from(6))
        .map(|(t, _)| t)
        .collect();
    assert_eq!(tail, vec![10]);
}

#[test]
fn broken_frame_times_are_remapped_forward() {
    let mut channel = scalar_channel(ChannelId::PositionX);
    channel.insert_keyframe(0, scalar_key(0.0, Interpolation::Constant));
    channel.insert_keyframe(1, scalar_key(1.0, Interpolation::Constant));

    assert_eq!(channel.workaround_broken_frame_time_bug(7), 7);
    assert_eq!(channel.workaround_broken_frame_time_bug(-5), 2);

    // Once tripped, later non-negative times also slide past occupied
    // slots instead of overwriting them.
    assert_eq!(channel.workaround_broken_frame_time_bug(0), 2);
    assert_eq!(channel.workaround_broken_frame_time_bug(7), 7);
}

#[test]
fn frames_hash_tracks_content() {
    let build = || {
        let mut channel = scalar_channel(ChannelId::Opacity);
        channel.insert_keyframe(0, scalar_key(0.25, Interpolation::Linear));
        channel.insert_keyframe(12, scalar_key(0.75, Interpolation::Linear));
        channel
    };
    let a = build();
    let mut b = build();
    assert_eq!(a.frames_hash(), b.frames_hash());

    b.set_scalar_value(12, 0.5);
    assert_ne!(a.frames_hash(), b.frames_hash());
}

#[test]
fn clone_for_detaches_cycles_from_the_source() {
    let (channel, cycle) = repeated_raster_channel();
    let store = Arc::new(TestStore::default());
    let clone = channel.clone_for(
        Weak::new(),
        Arc::new(TestBounds(AtomicI64::new(0))),
        Some(store),
    );

    let (_, cloned_cycle) = clone.active_repeat_at(25).unwrap();
    assert!(!Arc::ptr_eq(&cloned_cycle, &cycle));
    assert_eq!(cloned_cycle.repeats(), vec![20]);
    assert_eq!(cloned_cycle.original_range(), cycle.original_range());
    assert_eq!(clone.keyframe_count(), channel.keyframe_count());
    assert_eq!(clone.visible_keyframe_time_at(27), Some(5));
}

#[test]
fn edits_replay_through_an_undo_adapter() {
    use crate::engine::undo::UndoAdapter;

    #[derive(Default)]
    struct Stack(Mutex<Vec<ChannelEdit>>);

    impl UndoAdapter for Stack {
        fn push(&self, edit: ChannelEdit) {
            self.0.lock().unwrap().push(edit);
        }
    }

    let stack = Stack::default();
    let mut channel = scalar_channel(ChannelId::PositionX);
    stack.push(channel.insert_keyframe(0, scalar_key(1.0, Interpolation::Constant)));
    stack.push(channel.move_keyframe(0, 6).unwrap());
    assert_eq!(channel.value_at(6), Some(1.0));

    let mut edits = stack.0.into_inner().unwrap();
    while let Some(edit) = edits.pop() {
        channel.revert(&edit);
    }
    assert_eq!(channel.keyframe_count(), 0);
}

#[test]
fn discard_releases_displaced_raster_frames() {
    let (mut channel, store) = raster_channel();
    let first = channel.add_keyframe(5);
    let displaced_id = channel.keyframe_at(5).unwrap().as_raster().unwrap().frame_id;

    let second = channel.add_keyframe(5);
    channel.discard(second);
    assert_eq!(store.deleted.lock().unwrap().as_slice(), &[displaced_id]);

    channel.discard(first);
    assert_eq!(store.deleted.lock().unwrap().len(), 1);
}
