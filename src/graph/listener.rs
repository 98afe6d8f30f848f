use std::sync::atomic::{AtomicU64, Ordering};

use crate::channel::channel::ChannelId;
use crate::foundation::core::Rect;
use crate::graph::node::Node;
use crate::interval::set::FrameSet;

/// Monotonic version counter of a graph's shape.
///
/// Bumped exactly once per successful structural mutation; readers that
/// cached a traversal compare counters to learn whether it is stale.
#[derive(Debug, Default)]
pub struct GraphSequence(AtomicU64);

impl GraphSequence {
    /// The current version.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// Observer of structural and content changes of a node graph.
///
/// Every hook has an empty default body so implementors subscribe only
/// to what they care about. Structural hooks bracket the mutation:
/// `about_to_*` fires before anything changed, `*_has_been_*` after the
/// change is fully visible.
pub trait NodeGraphListener: Send + Sync {
    /// The shape version counter shared by all nodes of this graph.
    fn sequence(&self) -> &GraphSequence;

    /// A child is about to be inserted under `parent` at `index`.
    fn about_to_add_a_node(&self, parent: &Node, index: usize) {
        let _ = (parent, index);
    }

    /// A child has been inserted under `parent` at `index`.
    fn node_has_been_added(&self, parent: &Node, index: usize) {
        let _ = (parent, index);
    }

    /// The child of `parent` at `index` is about to be removed.
    fn about_to_remove_a_node(&self, parent: &Node, index: usize) {
        let _ = (parent, index);
    }

    /// The child of `parent` formerly at `index` has been removed.
    fn node_has_been_removed(&self, parent: &Node, index: usize) {
        let _ = (parent, index);
    }

    /// A child of `parent` is about to move from `from` to `to`.
    fn about_to_move_a_node(&self, parent: &Node, from: usize, to: usize) {
        let _ = (parent, from, to);
    }

    /// A child of `parent` has moved from `from` to `to`.
    fn node_has_been_moved(&self, parent: &Node, from: usize, to: usize) {
        let _ = (parent, from, to);
    }

    /// Non-structural content change on `node`.
    fn node_changed(&self, node: &Node) {
        let _ = node;
    }

    /// Cached projections of `node` over `frames` are stale within
    /// `rect`.
    fn invalidate_frames(&self, node: &Node, frames: &FrameSet, rect: Rect) {
        let _ = (node, frames, rect);
    }

    /// `node` needs its projection recomputed over `rects`.
    fn request_projection_update(&self, node: &Node, rects: &[Rect], reset_animation_cache: bool) {
        let _ = (node, rects, reset_animation_cache);
    }

    /// A keyframe channel was created on `node`.
    fn keyframe_channel_has_been_added(&self, node: &Node, channel: ChannelId) {
        let _ = (node, channel);
    }

    /// A keyframe channel on `node` is about to be dropped.
    fn keyframe_channel_about_to_be_removed(&self, node: &Node, channel: ChannelId) {
        let _ = (node, channel);
    }
}
