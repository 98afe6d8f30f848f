use std::sync::Arc;

use kurbo::{CubicBez, ParamCurve, Point, Vec2};

use crate::cycle::cycle::AnimationCycle;
use crate::engine::store::FrameId;

/// Interpolation mode of a scalar keyframe, applied toward the next key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Interpolation {
    /// Hold this key's value until the next key.
    Constant,
    /// Straight-line blend to the next key.
    Linear,
    /// Cubic Bezier blend using both keys' tangents.
    Bezier,
}

/// Tangent-locking behavior of a scalar keyframe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TangentMode {
    /// Tangents move independently.
    Sharp,
    /// Setting one tangent mirrors the other around the key.
    Smooth,
}

/// Numeric keyframe with interpolation toward its successor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalarKeyframe {
    /// The stored value.
    pub value: f64,
    /// Interpolation mode toward the next key.
    pub interpolation: Interpolation,
    /// Tangent locking mode.
    pub tangent_mode: TangentMode,
    /// Incoming Bezier tangent, relative to the key's (time, value).
    pub left_tangent: Vec2,
    /// Outgoing Bezier tangent, relative to the key's (time, value).
    pub right_tangent: Vec2,
}

impl ScalarKeyframe {
    /// A plain key holding `value` with constant interpolation.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            interpolation: Interpolation::Constant,
            tangent_mode: TangentMode::Smooth,
            left_tangent: Vec2::ZERO,
            right_tangent: Vec2::ZERO,
        }
    }

    /// Set the incoming tangent, mirroring the outgoing one in
    /// [`TangentMode::Smooth`].
    pub fn set_left_tangent(&mut self, tangent: Vec2) {
        self.left_tangent = tangent;
        if self.tangent_mode == TangentMode::Smooth {
            self.right_tangent = -tangent;
        }
    }

    /// Set the outgoing tangent, mirroring the incoming one in
    /// [`TangentMode::Smooth`].
    pub fn set_right_tangent(&mut self, tangent: Vec2) {
        self.right_tangent = tangent;
        if self.tangent_mode == TangentMode::Smooth {
            self.left_tangent = -tangent;
        }
    }
}

/// Raster keyframe: a counted handle into the external frame store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterKeyframe {
    /// Content handle in the paint device store.
    pub frame_id: FrameId,
}

/// A repeat instance of an [`AnimationCycle`]. It owns no content of its
/// own; all repeats of one cycle share the cycle by reference, and the
/// cycle is freed when its last holder goes away.
#[derive(Clone, Debug)]
pub struct RepeatKeyframe {
    /// The shared cycle this instance replays.
    pub cycle: Arc<AnimationCycle>,
}

/// Payload of a keyframe; the closed set of variants is matched
/// exhaustively wherever behavior differs per kind.
#[derive(Clone, Debug)]
pub enum KeyframeValue {
    /// Pixel content by handle.
    Raster(RasterKeyframe),
    /// Numeric value with interpolation.
    Scalar(ScalarKeyframe),
    /// Repeat instance of a cycle.
    Repeat(RepeatKeyframe),
}

/// A stored value at one time of a channel. The time itself is the key
/// of the owning channel's map and is not duplicated here.
#[derive(Clone, Debug)]
pub struct Keyframe {
    /// UI grouping tag.
    pub color_label: u32,
    /// The keyframe payload.
    pub value: KeyframeValue,
}

impl Keyframe {
    /// A raster keyframe over `frame_id` with the default label.
    pub fn raster(frame_id: FrameId) -> Self {
        Self {
            color_label: 0,
            value: KeyframeValue::Raster(RasterKeyframe { frame_id }),
        }
    }

    /// A scalar keyframe holding `value` with the default label.
    pub fn scalar(value: ScalarKeyframe) -> Self {
        Self {
            color_label: 0,
            value: KeyframeValue::Scalar(value),
        }
    }

    /// A repeat instance of `cycle` with the default label.
    pub fn repeat(cycle: Arc<AnimationCycle>) -> Self {
        Self {
            color_label: 0,
            value: KeyframeValue::Repeat(RepeatKeyframe { cycle }),
        }
    }

    /// The scalar payload, if this is a scalar keyframe.
    pub fn as_scalar(&self) -> Option<&ScalarKeyframe> {
        match &self.value {
            KeyframeValue::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// The raster payload, if this is a raster keyframe.
    pub fn as_raster(&self) -> Option<&RasterKeyframe> {
        match &self.value {
            KeyframeValue::Raster(raster) => Some(raster),
            _ => None,
        }
    }

    /// The repeat payload, if this is a repeat instance.
    pub fn as_repeat(&self) -> Option<&RepeatKeyframe> {
        match &self.value {
            KeyframeValue::Repeat(repeat) => Some(repeat),
            _ => None,
        }
    }

    /// Whether this keyframe is a repeat instance.
    pub fn is_repeat(&self) -> bool {
        matches!(self.value, KeyframeValue::Repeat(_))
    }
}

/// Evaluate the scalar value between two keys at `time`.
///
/// `t0`/`t1` are the key times bracketing `time` (`t0 <= time < t1`).
pub(crate) fn interpolated_value(
    t0: i64,
    k0: &ScalarKeyframe,
    t1: i64,
    k1: &ScalarKeyframe,
    time: i64,
) -> f64 {
    match k0.interpolation {
        Interpolation::Constant => k0.value,
        Interpolation::Linear => {
            let t = (time - t0) as f64 / (t1 - t0) as f64;
            k0.value + (k1.value - k0.value) * t
        }
        Interpolation::Bezier => {
            let p0 = Point::new(t0 as f64, k0.value);
            let p3 = Point::new(t1 as f64, k1.value);
            let mut p1 = p0 + k0.right_tangent;
            let mut p2 = p3 + k1.left_tangent;
            // The curve must stay a function of time.
            p1.x = p1.x.clamp(p0.x, p3.x);
            p2.x = p2.x.clamp(p0.x, p3.x);

            let u = find_curve_parameter(p0.x, p1.x, p2.x, p3.x, time as f64);
            CubicBez::new(p0, p1, p2, p3).eval(u).y
        }
    }
}

/// Invert the cubic Bezier's X polynomial: find the curve parameter `u`
/// in `[0, 1]` whose X coordinate equals `x`.
pub(crate) fn find_curve_parameter(x0: f64, x1: f64, x2: f64, x3: f64, x: f64) -> f64 {
    let c3 = x3 - 3.0 * x2 + 3.0 * x1 - x0;
    let c2 = 3.0 * x2 - 6.0 * x1 + 3.0 * x0;
    let c1 = 3.0 * x1 - 3.0 * x0;
    let c0 = x0 - x;

    const EPS: f64 = 1e-9;
    for root in kurbo::common::solve_cubic(c0, c1, c2, c3) {
        if (-EPS..=1.0 + EPS).contains(&root) {
            return root.clamp(0.0, 1.0);
        }
    }

    // Clamped control points keep X monotonic, so a root in range exists
    // up to numeric noise; fall back to the linear parameter.
    if x3 > x0 {
        ((x - x0) / (x3 - x0)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
