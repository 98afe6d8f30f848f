use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::channel::channel::{ChannelId, KeyframeChannel, TimelineBounds};
use crate::engine::store::PaintDeviceFrameStore;
use crate::foundation::core::Rect;
use crate::graph::listener::NodeGraphListener;
use crate::interval::set::FrameSet;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// What a node is, which constrains where it may sit in the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    /// The unique tree root. Never a child.
    Root,
    /// A content layer; may nest under the root or another layer.
    Layer,
    /// A mask refining its parent layer. Leaf only.
    Mask,
}

impl NodeKind {
    /// Whether a node of this kind accepts `child` below it.
    pub fn allows_as_child(self, child: NodeKind) -> bool {
        match (self, child) {
            (Self::Root, Self::Layer) => true,
            (Self::Layer, Self::Layer | Self::Mask) => true,
            _ => false,
        }
    }
}

/// One node of the animated scene graph.
///
/// Nodes are shared through `Arc`; the parent link is weak so a detached
/// subtree frees itself. The children list follows a single-writer,
/// many-reader discipline: read traversal is safe concurrently with one
/// structural mutation, which swaps the list under a short write lock.
pub struct Node {
    id: u64,
    kind: NodeKind,
    name: RwLock<String>,
    parent: RwLock<Weak<Node>>,
    children: RwLock<Vec<Arc<Node>>>,
    listener: RwLock<Weak<dyn NodeGraphListener>>,
    channels: RwLock<BTreeMap<ChannelId, KeyframeChannel>>,
    bounds: Arc<dyn TimelineBounds>,
    store: Option<Arc<dyn PaintDeviceFrameStore>>,
}

impl Node {
    /// A fresh, unattached node.
    ///
    /// `store` backs raster channels created on this node; scalar-only
    /// nodes may pass `None`.
    pub fn new(
        kind: NodeKind,
        name: impl Into<String>,
        bounds: Arc<dyn TimelineBounds>,
        store: Option<Arc<dyn PaintDeviceFrameStore>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            name: RwLock::new(name.into()),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            listener: RwLock::new(Weak::<NullListener>::new()),
            channels: RwLock::new(BTreeMap::new()),
            bounds,
            store,
        })
    }

    /// Stable identity of this node, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The node's display name.
    pub fn name(&self) -> String {
        read(&self.name).clone()
    }

    /// Rename the node.
    pub fn set_name(&self, name: impl Into<String>) {
        *write(&self.name) = name.into();
        if let Some(l) = self.listener() {
            l.node_changed(self);
        }
    }

    // ---- read traversal ----------------------------------------------

    /// The node's parent, if attached.
    pub fn parent(&self) -> Option<Arc<Node>> {
        read(&self.parent).upgrade()
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        read(&self.children).len()
    }

    /// The child at `index`.
    pub fn at(&self, index: usize) -> Option<Arc<Node>> {
        read(&self.children).get(index).cloned()
    }

    /// The first child.
    pub fn first_child(&self) -> Option<Arc<Node>> {
        self.at(0)
    }

    /// Position of `child` in this node's children list.
    pub fn index_of(&self, child: &Arc<Node>) -> Option<usize> {
        read(&self.children)
            .iter()
            .position(|c| Arc::ptr_eq(c, child))
    }

    /// Visit `node` and its whole subtree in preorder.
    pub fn visit(node: &Arc<Node>, f: &mut impl FnMut(&Arc<Node>)) {
        f(node);
        let children = read(&node.children).clone();
        for child in &children {
            Self::visit(child, f);
        }
    }

    fn is_or_has_descendant(node: &Arc<Node>, candidate: &Arc<Node>) -> bool {
        if Arc::ptr_eq(node, candidate) {
            return true;
        }
        read(&node.children)
            .iter()
            .any(|child| Self::is_or_has_descendant(child, candidate))
    }

    // ---- structural mutation -----------------------------------------

    /// Insert `child` under `parent` at `index`.
    ///
    /// Fails, mutating nothing, when the index is out of range, the
    /// kinds do not pair, the child is already attached, or the
    /// insertion would close a cycle.
    pub fn add(parent: &Arc<Node>, child: Arc<Node>, index: usize) -> bool {
        if index > parent.child_count()
            || !parent.kind.allows_as_child(child.kind)
            || child.parent().is_some()
            || Self::is_or_has_descendant(&child, parent)
        {
            return false;
        }

        let listener = read(&parent.listener).clone();
        if let Some(l) = listener.upgrade() {
            l.about_to_add_a_node(parent, index);
        }

        *write(&child.parent) = Arc::downgrade(parent);
        child.set_listener(&listener);
        write(&parent.children).insert(index, child);

        if let Some(l) = listener.upgrade() {
            l.node_has_been_added(parent, index);
            l.sequence().bump();
        }
        true
    }

    /// Detach `child` from `parent`. Fails when `child` is not a child
    /// of `parent`.
    ///
    /// The detached subtree loses its listener along with its parent
    /// link; edits on removed nodes no longer reach the old graph's
    /// owner.
    pub fn remove(parent: &Arc<Node>, child: &Arc<Node>) -> bool {
        let Some(index) = parent.index_of(child) else {
            return false;
        };

        let listener = read(&parent.listener).upgrade();
        if let Some(l) = &listener {
            l.about_to_remove_a_node(parent, index);
        }

        write(&parent.children).remove(index);
        *write(&child.parent) = Weak::new();
        let detached: Weak<dyn NodeGraphListener> = Weak::<NullListener>::new();
        child.set_listener(&detached);

        if let Some(l) = &listener {
            l.node_has_been_removed(parent, index);
            l.sequence().bump();
        }
        true
    }

    /// Reorder the child at `from` to position `to` within `parent`.
    /// Equal positions succeed without touching anything.
    pub fn move_child(parent: &Arc<Node>, from: usize, to: usize) -> bool {
        let count = parent.child_count();
        if from >= count || to >= count {
            return false;
        }
        if from == to {
            return true;
        }

        let listener = read(&parent.listener).upgrade();
        if let Some(l) = &listener {
            l.about_to_move_a_node(parent, from, to);
        }

        {
            let mut children = write(&parent.children);
            let child = children.remove(from);
            children.insert(to, child);
        }

        if let Some(l) = &listener {
            l.node_has_been_moved(parent, from, to);
            l.sequence().bump();
        }
        true
    }

    /// Attach `listener` to this node and its whole subtree. New
    /// children inherit it on insertion.
    pub fn set_listener(&self, listener: &Weak<dyn NodeGraphListener>) {
        *write(&self.listener) = listener.clone();
        let children = read(&self.children).clone();
        for child in &children {
            child.set_listener(listener);
        }
    }

    fn listener(&self) -> Option<Arc<dyn NodeGraphListener>> {
        read(&self.listener).upgrade()
    }

    // ---- keyframe channels -------------------------------------------

    /// Create the channel `id` on `node` if it does not exist yet.
    /// Returns whether a channel was created.
    pub fn ensure_channel(node: &Arc<Node>, id: ChannelId) -> bool {
        {
            let mut channels = write(&node.channels);
            if channels.contains_key(&id) {
                return false;
            }
            let store = if id.is_raster() {
                node.store.clone()
            } else {
                None
            };
            channels.insert(
                id,
                KeyframeChannel::new(id, Arc::downgrade(node), node.bounds.clone(), store),
            );
        }
        if let Some(l) = node.listener() {
            l.keyframe_channel_has_been_added(node, id);
        }
        true
    }

    /// Drop the channel `id`. Returns whether a channel existed.
    pub fn remove_channel(&self, id: ChannelId) -> bool {
        if !read(&self.channels).contains_key(&id) {
            return false;
        }
        if let Some(l) = self.listener() {
            l.keyframe_channel_about_to_be_removed(self, id);
        }
        write(&self.channels).remove(&id).is_some()
    }

    /// Run `f` against the channel `id`.
    pub fn channel<R>(&self, id: ChannelId, f: impl FnOnce(&KeyframeChannel) -> R) -> Option<R> {
        read(&self.channels).get(&id).map(f)
    }

    /// Run `f` against the channel `id` with mutable access.
    pub fn channel_mut<R>(
        &self,
        id: ChannelId,
        f: impl FnOnce(&mut KeyframeChannel) -> R,
    ) -> Option<R> {
        write(&self.channels).get_mut(&id).map(f)
    }

    /// Identities of all channels on this node.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        read(&self.channels).keys().copied().collect()
    }

    // ---- change notification -----------------------------------------

    /// Report that cached frames of this node are stale.
    pub fn invalidate_frames(&self, frames: &FrameSet, rect: Rect) {
        if let Some(l) = self.listener() {
            l.invalidate_frames(self, frames, rect);
        }
    }

    /// Request a projection recompute over `rects`.
    pub fn request_projection_update(&self, rects: &[Rect], reset_animation_cache: bool) {
        if let Some(l) = self.listener() {
            l.request_projection_update(self, rects, reset_animation_cache);
        }
    }

    /// Mark the node dirty at the current time.
    pub fn set_dirty(&self, rects: &[Rect]) {
        self.request_projection_update(rects, false);
    }

    // ---- duplication --------------------------------------------------

    /// Deep-copy `node` and its subtree into a fresh, unattached tree.
    /// Channels are cloned with [`KeyframeChannel::clone_for`]; no
    /// listener hooks fire for the copies.
    pub fn duplicate(node: &Arc<Node>) -> Arc<Node> {
        let copy = Node::new(node.kind, node.name(), node.bounds.clone(), node.store.clone());
        {
            let source = read(&node.channels);
            let mut target = write(&copy.channels);
            for (&id, channel) in source.iter() {
                target.insert(
                    id,
                    channel.clone_for(
                        Arc::downgrade(&copy),
                        copy.bounds.clone(),
                        copy.store.clone(),
                    ),
                );
            }
        }
        let children = read(&node.children).clone();
        for child in &children {
            let child_copy = Self::duplicate(child);
            *write(&child_copy.parent) = Arc::downgrade(&copy);
            write(&copy.children).push(child_copy);
        }
        copy
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name())
            .field("children", &self.child_count())
            .finish()
    }
}

/// Placeholder listener type used to build an empty `Weak`.
struct NullListener;

impl NodeGraphListener for NullListener {
    fn sequence(&self) -> &crate::graph::listener::GraphSequence {
        unreachable!("null listener is never instantiated")
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
#[path = "../../tests/unit/graph/node.rs"]
mod tests;
