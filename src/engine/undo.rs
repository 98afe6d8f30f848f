use crate::channel::channel::ChannelEdit;

/// Sink for the undo data produced by channel edits.
///
/// The core constructs [`ChannelEdit`] values describing how to revert
/// each mutation and hands them to this adapter; executing undo/redo is
/// entirely the collaborator's business.
pub trait UndoAdapter: Send + Sync {
    /// Record one edit on the owning document's undo stack.
    fn push(&self, edit: ChannelEdit);
}
