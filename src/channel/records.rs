use std::sync::Arc;

use crate::channel::channel::{ChannelId, KeyframeChannel};
use crate::channel::keyframe::{
    Interpolation, Keyframe, KeyframeValue, RasterKeyframe, ScalarKeyframe, TangentMode,
};
use crate::cycle::cycle::AnimationCycle;
use crate::engine::store::FrameId;
use crate::foundation::core::{FrameTime, Vec2};
use crate::foundation::error::{CadenceError, CadenceResult};
use crate::interval::span::TimeSpan;

/// Stored payload of one keyframe. Repeats are not stored per keyframe;
/// they are reconstructed from [`CycleRecord::repeats`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum KeyframePayload {
    /// Raster frame handle in the document's frame store.
    Raster {
        /// Stored frame handle.
        frame: u64,
    },
    /// Scalar key with its interpolation parameters.
    Scalar {
        /// Stored value.
        value: f64,
        /// Interpolation toward the next key.
        interpolation: Interpolation,
        /// Tangent locking mode.
        tangent_mode: TangentMode,
        /// Incoming Bezier tangent.
        left_tangent: Vec2,
        /// Outgoing Bezier tangent.
        right_tangent: Vec2,
    },
}

/// Stored form of one keyframe.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct KeyframeRecord {
    /// Frame time; legacy documents may carry negative values here.
    pub time: FrameTime,
    /// UI grouping tag.
    pub color_label: u32,
    /// The keyframe payload.
    pub payload: KeyframePayload,
}

/// Stored form of one animation cycle and its repeat instances.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CycleRecord {
    /// First source keyframe of the replayed range.
    pub first_keyframe: FrameTime,
    /// Last source keyframe of the replayed range, inclusive.
    pub last_keyframe: FrameTime,
    /// Start times of the cycle's repeat instances.
    pub repeats: Vec<FrameTime>,
}

/// Stored form of a whole channel. The container format around these
/// records is the embedder's business; serde keeps them format-agnostic.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ChannelRecord {
    /// Identity of the recorded channel.
    pub channel: ChannelId,
    /// All non-repeat keyframes, in increasing time order.
    pub keyframes: Vec<KeyframeRecord>,
    /// All cycles with their repeats.
    pub cycles: Vec<CycleRecord>,
}

impl KeyframeChannel {
    /// Capture the channel's current state as a storable record.
    pub fn to_record(&self) -> ChannelRecord {
        let mut keyframes = Vec::new();
        let mut cycles: Vec<(*const AnimationCycle, CycleRecord)> = Vec::new();

        for (time, key) in self.items_within(TimeSpan::infinite_from(0)) {
            match &key.value {
                KeyframeValue::Raster(raster) => keyframes.push(KeyframeRecord {
                    time,
                    color_label: key.color_label,
                    payload: KeyframePayload::Raster {
                        frame: raster.frame_id.0,
                    },
                }),
                KeyframeValue::Scalar(scalar) => keyframes.push(KeyframeRecord {
                    time,
                    color_label: key.color_label,
                    payload: KeyframePayload::Scalar {
                        value: scalar.value,
                        interpolation: scalar.interpolation,
                        tangent_mode: scalar.tangent_mode,
                        left_tangent: scalar.left_tangent,
                        right_tangent: scalar.right_tangent,
                    },
                }),
                KeyframeValue::Repeat(repeat) => {
                    let ptr = Arc::as_ptr(&repeat.cycle);
                    match cycles.iter_mut().find(|(p, _)| *p == ptr) {
                        Some((_, record)) => record.repeats.push(time),
                        None => {
                            let range = repeat.cycle.original_range();
                            cycles.push((
                                ptr,
                                CycleRecord {
                                    first_keyframe: range.start().unwrap_or(0),
                                    last_keyframe: range.end().unwrap_or(0),
                                    repeats: vec![time],
                                },
                            ));
                        }
                    }
                }
            }
        }

        ChannelRecord {
            channel: self.id(),
            keyframes,
            cycles: cycles.into_iter().map(|(_, record)| record).collect(),
        }
    }

    /// Populate the channel from a stored record.
    ///
    /// Invalid cycles and colliding repeats are skipped with a warning
    /// rather than failing the whole load; a payload that contradicts
    /// the channel kind is an error.
    pub fn load_record(&mut self, record: &ChannelRecord) -> CadenceResult<()> {
        if record.channel != self.id() {
            return Err(CadenceError::record(format!(
                "record for channel '{}' loaded into channel '{}'",
                record.channel.name(),
                self.id().name()
            )));
        }

        for keyframe in &record.keyframes {
            let time = self.workaround_broken_frame_time_bug(keyframe.time);
            let value = match keyframe.payload {
                KeyframePayload::Raster { frame } => {
                    if !self.id().is_raster() {
                        return Err(CadenceError::record(format!(
                            "raster keyframe in scalar channel '{}'",
                            self.id().name()
                        )));
                    }
                    KeyframeValue::Raster(RasterKeyframe {
                        frame_id: FrameId(frame),
                    })
                }
                KeyframePayload::Scalar {
                    value,
                    interpolation,
                    tangent_mode,
                    left_tangent,
                    right_tangent,
                } => {
                    if self.id().is_raster() {
                        return Err(CadenceError::record(format!(
                            "scalar keyframe in raster channel '{}'",
                            self.id().name()
                        )));
                    }
                    KeyframeValue::Scalar(ScalarKeyframe {
                        value,
                        interpolation,
                        tangent_mode,
                        left_tangent,
                        right_tangent,
                    })
                }
            };
            self.insert_loaded(
                time,
                Keyframe {
                    color_label: keyframe.color_label,
                    value,
                },
            );
        }

        for cycle_record in &record.cycles {
            if cycle_record.first_keyframe < 0
                || cycle_record.last_keyframe < cycle_record.first_keyframe
            {
                tracing::warn!(
                    first = cycle_record.first_keyframe,
                    last = cycle_record.last_keyframe,
                    "invalid cycle range in stored data, skipping"
                );
                continue;
            }
            let cycle = Arc::new(AnimationCycle::new(
                cycle_record.first_keyframe,
                cycle_record.last_keyframe,
            ));
            for &repeat in &cycle_record.repeats {
                if repeat < 0 {
                    tracing::warn!(time = repeat, "negative repeat time in stored data, skipping");
                    continue;
                }
                if self.keyframe_at(repeat).is_some() {
                    tracing::warn!(
                        time = repeat,
                        "stored repeat collides with a keyframe, skipping"
                    );
                    continue;
                }
                self.insert_loaded(repeat, Keyframe::repeat(cycle.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/channel/records.rs"]
mod tests;
