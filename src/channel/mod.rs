pub mod channel;
pub mod keyframe;
pub mod records;
