use std::sync::Mutex;
use std::sync::atomic::AtomicI64;

use super::*;
use crate::channel::keyframe::{Keyframe, ScalarKeyframe};
use crate::engine::store::FrameId;
use crate::foundation::core::FrameTime;
use crate::graph::listener::GraphSequence;

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
struct TestStore(AtomicU64);

impl PaintDeviceFrameStore for TestStore {
    fn create_frame(&self, _copy_from: Option<FrameId>) -> FrameId {
        FrameId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn delete_frame(&self, _frame: FrameId) {}

    fn upload_frame(&self, _from: FrameId, _to: FrameId) {}

    fn write_frame_to_device(&self, _frame: FrameId) {}

    fn frame_bounds(&self, _frame: FrameId) -> Rect {
        Rect::new(0.0, 0.0, 64.0, 64.0)
    }
}

#[derive(Default)]
struct Recorder {
    sequence: GraphSequence,
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl NodeGraphListener for Recorder {
    fn sequence(&self) -> &GraphSequence {
        &self.sequence
    }

    fn about_to_add_a_node(&self, _parent: &Node, index: usize) {
        self.push(format!("about_add:{index}"));
    }

    fn node_has_been_added(&self, _parent: &Node, index: usize) {
        self.push(format!("added:{index}"));
    }

    fn about_to_remove_a_node(&self, _parent: &Node, index: usize) {
        self.push(format!("about_remove:{index}"));
    }

    fn node_has_been_removed(&self, _parent: &Node, index: usize) {
        self.push(format!("removed:{index}"));
    }

    fn about_to_move_a_node(&self, _parent: &Node, from: usize, to: usize) {
        self.push(format!("about_move:{from}->{to}"));
    }

    fn node_has_been_moved(&self, _parent: &Node, from: usize, to: usize) {
        self.push(format!("moved:{from}->{to}"));
    }

    fn invalidate_frames(&self, _node: &Node, _frames: &FrameSet, _rect: Rect) {
        self.push("invalidate");
    }

    fn request_projection_update(&self, _node: &Node, _rects: &[Rect], _reset: bool) {
        self.push("dirty");
    }

    fn keyframe_channel_has_been_added(&self, _node: &Node, channel: ChannelId) {
        self.push(format!("channel_added:{}", channel.name()));
    }

    fn keyframe_channel_about_to_be_removed(&self, _node: &Node, channel: ChannelId) {
        self.push(format!("channel_removing:{}", channel.name()));
    }
}

fn bounds() -> Arc<TestBounds> {
    Arc::new(TestBounds(AtomicI64::new(0)))
}

fn listened_root() -> (Arc<Node>, Arc<Recorder>, Arc<TestBounds>) {
    let bounds = bounds();
    let root = Node::new(NodeKind::Root, "root", bounds.clone(), None);
    let recorder = Arc::new(Recorder::default());
    let listener: Arc<dyn NodeGraphListener> = recorder.clone();
    root.set_listener(&Arc::downgrade(&listener));
    (root, recorder, bounds)
}

fn layer(bounds: &Arc<TestBounds>) -> Arc<Node> {
    let store: Arc<dyn PaintDeviceFrameStore> = Arc::new(TestStore::default());
    Node::new(NodeKind::Layer, "layer", bounds.clone(), Some(store))
}

#[test]
fn kind_pairing_is_enforced() {
    let (root, recorder, bounds) = listened_root();
    let mask = Node::new(NodeKind::Mask, "mask", bounds.clone(), None);

    assert!(!Node::add(&root, mask, 0));
    assert_eq!(recorder.sequence.current(), 0);
    assert!(recorder.events().is_empty());

    let child = layer(&bounds);
    assert!(Node::add(&root, child, 0));
    assert_eq!(recorder.sequence.current(), 1);
    assert_eq!(recorder.events(), vec!["about_add:0", "added:0"]);
}

#[test]
fn add_rejects_bad_index_and_attached_children() {
    let (root, recorder, bounds) = listened_root();
    let child = layer(&bounds);

    assert!(!Node::add(&root, child.clone(), 1));
    assert!(Node::add(&root, child.clone(), 0));

    // Already attached elsewhere.
    let other = Node::new(NodeKind::Root, "other", bounds.clone(), None);
    assert!(!Node::add(&other, child, 0));
    assert_eq!(recorder.sequence.current(), 1);
}

#[test]
fn add_rejects_cycles() {
    let bounds = bounds();
    let a = layer(&bounds);
    let b = layer(&bounds);
    assert!(Node::add(&a, b.clone(), 0));
    assert!(!Node::add(&b, a.clone(), 0));
    assert!(a.parent().is_none());
    assert_eq!(b.child_count(), 0);
}

#[test]
fn remove_detaches_and_notifies() {
    let (root, recorder, bounds) = listened_root();
    let child = layer(&bounds);
    assert!(Node::add(&root, child.clone(), 0));

    assert!(Node::remove(&root, &child));
    assert!(child.parent().is_none());
    assert_eq!(root.child_count(), 0);
    assert_eq!(recorder.sequence.current(), 2);
    assert_eq!(
        recorder.events(),
        vec!["about_add:0", "added:0", "about_remove:0", "removed:0"]
    );

    assert!(!Node::remove(&root, &child));
    assert_eq!(recorder.sequence.current(), 2);
}

#[test]
fn move_child_reorders_in_place() {
    let (root, recorder, bounds) = listened_root();
    let (x, y, z) = (layer(&bounds), layer(&bounds), layer(&bounds));
    x.set_name("x");
    y.set_name("y");
    z.set_name("z");
    assert!(Node::add(&root, x.clone(), 0));
    assert!(Node::add(&root, y, 1));
    assert!(Node::add(&root, z, 2));

    assert!(Node::move_child(&root, 0, 2));
    let names: Vec<_> = (0..3).map(|i| root.at(i).unwrap().name()).collect();
    assert_eq!(names, vec!["y", "z", "x"]);
    assert_eq!(recorder.sequence.current(), 4);

    // Equal positions succeed without a bump.
    assert!(Node::move_child(&root, 1, 1));
    assert_eq!(recorder.sequence.current(), 4);

    assert!(!Node::move_child(&root, 0, 3));
    assert_eq!(root.index_of(&x), Some(2));
}

#[test]
fn removed_subtrees_stop_reporting() {
    let (root, recorder, bounds) = listened_root();
    let parent = layer(&bounds);
    let mask = Node::new(NodeKind::Mask, "mask", bounds.clone(), None);
    assert!(Node::add(&parent, mask.clone(), 0));
    assert!(Node::add(&root, parent.clone(), 0));
    assert!(Node::ensure_channel(&parent, ChannelId::Content));
    assert!(Node::ensure_channel(&mask, ChannelId::Opacity));

    assert!(Node::remove(&root, &parent));
    let before = recorder.events().len();

    // The whole detached subtree is disconnected, not just its top.
    parent.channel_mut(ChannelId::Content, |channel| {
        channel.add_keyframe(0);
    });
    mask.channel_mut(ChannelId::Opacity, |channel| {
        channel.insert_keyframe(2, Keyframe::scalar(ScalarKeyframe::new(0.5)));
    });
    assert_eq!(recorder.events().len(), before);
}

#[test]
fn listener_propagates_to_inserted_subtrees() {
    let (root, recorder, bounds) = listened_root();
    let parent = layer(&bounds);
    let mask = Node::new(NodeKind::Mask, "mask", bounds.clone(), None);
    assert!(Node::add(&parent, mask.clone(), 0));

    // Built detached, so nothing was recorded yet.
    assert!(recorder.events().is_empty());

    assert!(Node::add(&root, parent, 0));
    assert!(Node::ensure_channel(&mask, ChannelId::Opacity));
    assert!(
        recorder
            .events()
            .contains(&"channel_added:opacity".to_string())
    );
}

#[test]
fn ensure_channel_is_idempotent() {
    let (root, recorder, bounds) = listened_root();
    let child = layer(&bounds);
    assert!(Node::add(&root, child.clone(), 0));

    assert!(Node::ensure_channel(&child, ChannelId::Content));
    assert!(!Node::ensure_channel(&child, ChannelId::Content));
    assert_eq!(child.channel_ids(), vec![ChannelId::Content]);

    assert!(child.remove_channel(ChannelId::Content));
    assert!(!child.remove_channel(ChannelId::Content));
    assert_eq!(
        recorder.events().last().unwrap(),
        "channel_removing:content"
    );
}

#[test]
fn channel_edits_reach_the_listener() {
    let (root, recorder, bounds) = listened_root();
    let child = layer(&bounds);
    assert!(Node::add(&root, child.clone(), 0));
    assert!(Node::ensure_channel(&child, ChannelId::Content));

    // Playhead at 0: the edit touches the visible frame.
    child.channel_mut(ChannelId::Content, |channel| {
        channel.add_keyframe(0);
    });
    let events = recorder.events();
    assert!(events.contains(&"invalidate".to_string()));
    assert!(events.contains(&"dirty".to_string()));

    // Playhead far away: invalidation only.
    bounds.0.store(2, Ordering::Relaxed);
    child.channel_mut(ChannelId::Content, |channel| {
        channel.add_keyframe(5);
    });
    let events = recorder.events();
    assert_eq!(events.iter().filter(|e| *e == "dirty").count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "invalidate").count(), 2);
}

#[test]
fn duplicate_clones_channels_and_subtree() {
    let bounds = bounds();
    let original = layer(&bounds);
    let mask = Node::new(NodeKind::Mask, "mask", bounds.clone(), None);
    assert!(Node::add(&original, mask, 0));
    assert!(Node::ensure_channel(&original, ChannelId::Opacity));
    original.channel_mut(ChannelId::Opacity, |channel| {
        channel.insert_keyframe(3, Keyframe::scalar(ScalarKeyframe::new(0.5)));
    });

    let copy = Node::duplicate(&original);
    assert!(copy.parent().is_none());
    assert_eq!(copy.child_count(), 1);
    assert_eq!(copy.name(), original.name());

    copy.channel_mut(ChannelId::Opacity, |channel| {
        channel.set_scalar_value(3, 0.9);
    });
    let copied = copy
        .channel(ChannelId::Opacity, |c| c.value_at(3))
        .flatten();
    let kept = original
        .channel(ChannelId::Opacity, |c| c.value_at(3))
        .flatten();
    assert_eq!(copied, Some(0.9));
    assert_eq!(kept, Some(0.5));
}
