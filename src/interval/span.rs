use crate::foundation::core::FrameTime;

/// A contiguous interval of frame times, possibly unbounded above.
///
/// Finite spans are inclusive on both ends; `Finite { start: 3, end: 3 }`
/// is the single frame 3. The empty span is a distinguished value rather
/// than a degenerate start/end pair, so every constructor is total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TimeSpan {
    /// The distinguished empty span.
    Empty,
    /// Inclusive `[start, end]` with `0 <= start <= end`.
    Finite {
        /// First frame of the span.
        start: FrameTime,
        /// Last frame of the span, inclusive.
        end: FrameTime,
    },
    /// Unbounded `[start, +inf)`.
    Infinite {
        /// First frame of the span.
        start: FrameTime,
    },
}

impl TimeSpan {
    /// A finite span `[start, end]`. Returns [`TimeSpan::Empty`] when
    /// `end < start`.
    pub fn finite(start: FrameTime, end: FrameTime) -> Self {
        if end < start {
            return Self::Empty;
        }
        Self::Finite {
            start: start.max(0),
            end: end.max(0),
        }
    }

    /// The single-frame span `[time, time]`.
    pub fn frame(time: FrameTime) -> Self {
        Self::finite(time, time)
    }

    /// The unbounded span `[start, +inf)`.
    pub fn infinite_from(start: FrameTime) -> Self {
        Self::Infinite {
            start: start.max(0),
        }
    }

    /// Whether this is the empty span.
    pub fn is_empty(self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Whether the span extends to infinity.
    pub fn is_infinite(self) -> bool {
        matches!(self, Self::Infinite { .. })
    }

    /// First frame of the span, `None` when empty.
    pub fn start(self) -> Option<FrameTime> {
        match self {
            Self::Empty => None,
            Self::Finite { start, .. } | Self::Infinite { start } => Some(start),
        }
    }

    /// Last frame of the span, `None` when empty or unbounded.
    pub fn end(self) -> Option<FrameTime> {
        match self {
            Self::Finite { end, .. } => Some(end),
            _ => None,
        }
    }

    /// Number of frames in a finite span, `None` otherwise.
    pub fn duration(self) -> Option<i64> {
        match self {
            Self::Finite { start, end } => Some(end - start + 1),
            _ => None,
        }
    }

    /// Whether `time` lies inside the span.
    pub fn contains(self, time: FrameTime) -> bool {
        match self {
            Self::Empty => false,
            Self::Finite { start, end } => start <= time && time <= end,
            Self::Infinite { start } => start <= time,
        }
    }

    /// The smallest span covering both operands.
    ///
    /// Either operand being empty yields the other; an infinite operand
    /// makes the result infinite.
    pub fn union(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Empty, other) | (other, Self::Empty) => other,
            (a, b) => {
                let start = a.start().min(b.start()).unwrap_or(0);
                match (a.end(), b.end()) {
                    (Some(ea), Some(eb)) => Self::finite(start, ea.max(eb)),
                    _ => Self::infinite_from(start),
                }
            }
        }
    }

    /// The overlap of both operands; empty when they do not intersect.
    ///
    /// An infinite operand contributes no upper bound; intersecting two
    /// infinite spans stays infinite.
    pub fn intersect(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Empty, _) | (_, Self::Empty) => Self::Empty,
            (a, b) => {
                let start = match (a.start(), b.start()) {
                    (Some(sa), Some(sb)) => sa.max(sb),
                    _ => return Self::Empty,
                };
                match (a.end(), b.end()) {
                    (None, None) => Self::infinite_from(start),
                    (Some(e), None) | (None, Some(e)) => Self::finite(start, e),
                    (Some(ea), Some(eb)) => Self::finite(start, ea.min(eb)),
                }
            }
        }
    }
}

impl Default for TimeSpan {
    fn default() -> Self {
        Self::Empty
    }
}
