use crate::foundation::error::{CadenceError, CadenceResult};

pub use kurbo::{Point, Rect, Vec2};

/// Discrete frame time on a document timeline.
///
/// Valid times are non-negative. Negative values only occur transiently
/// while loading legacy documents (see
/// [`crate::KeyframeChannel::workaround_broken_frame_time_bug`]) and are
/// normalized before they reach any other API.
pub type FrameTime = i64;

/// Playback rate as a rational number of frames per second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Framerate {
    /// Numerator, must be > 0.
    pub num: u32,
    /// Denominator, must be > 0.
    pub den: u32,
}

impl Framerate {
    /// Build a validated framerate.
    pub fn new(num: u32, den: u32) -> CadenceResult<Self> {
        if num == 0 {
            return Err(CadenceError::validation("Framerate num must be > 0"));
        }
        if den == 0 {
            return Err(CadenceError::validation("Framerate den must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// The rate as a floating point frames-per-second value.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of a single frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 24, den: 1 }
    }
}
