use crate::foundation::core::Rect;

/// Stable handle to one frame of pixel content in the external paint
/// device store. Raster keyframes are thin handles into that store; the
/// pixel data itself never enters this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameId(pub u64);

/// External tile/pixel storage for raster keyframe content.
///
/// Implementors own their interior mutability; the store sits behind an
/// `Arc` and is shared by every raster channel of a document. Methods
/// take `&self` so calls are valid from whichever thread runs the edit.
pub trait PaintDeviceFrameStore: Send + Sync {
    /// Allocate a new frame, optionally cloned from an existing one.
    fn create_frame(&self, copy_from: Option<FrameId>) -> FrameId;

    /// Release a frame. Further use of the id is a caller bug.
    fn delete_frame(&self, frame: FrameId);

    /// Copy the content of `from` over the content of `to`.
    fn upload_frame(&self, from: FrameId, to: FrameId);

    /// Make `frame` the visible content of the owning paint device.
    fn write_frame_to_device(&self, frame: FrameId);

    /// Bounding rectangle of the frame's non-transparent content.
    fn frame_bounds(&self, frame: FrameId) -> Rect;
}
