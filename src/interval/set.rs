use crate::foundation::core::FrameTime;
use crate::interval::span::TimeSpan;

/// One contiguous finite run of frames, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRun {
    /// First frame of the run.
    pub start: FrameTime,
    /// Last frame of the run, inclusive.
    pub end: FrameTime,
}

/// A set of frame times stored as disjoint, non-adjacent, increasing
/// finite runs plus an optional "first frame of infinity" marker.
///
/// The representation is canonical: overlapping or touching runs are
/// merged at construction, and a run that touches the infinite tail is
/// absorbed into it by lowering the marker. Canonical form makes
/// structural equality coincide with set equality.
///
/// Sets are values; they are only ever rebuilt through the algebraic
/// operators `|`, `&` and `-`.
#[derive(Clone, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct FrameSet {
    runs: Vec<FrameRun>,
    infinite_from: Option<FrameTime>,
}

impl FrameSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The set of all frames in `[start, end]`; empty when `end < start`.
    pub fn between(start: FrameTime, end: FrameTime) -> Self {
        if end < start {
            return Self::empty();
        }
        Self {
            runs: vec![FrameRun { start, end }],
            infinite_from: None,
        }
    }

    /// The set of all frames at or after `start`.
    pub fn infinite_from(start: FrameTime) -> Self {
        Self {
            runs: Vec::new(),
            infinite_from: Some(start),
        }
    }

    /// The set covering exactly one span.
    pub fn from_span(span: TimeSpan) -> Self {
        match span {
            TimeSpan::Empty => Self::empty(),
            TimeSpan::Finite { start, end } => Self::between(start, end),
            TimeSpan::Infinite { start } => Self::infinite_from(start),
        }
    }

    /// Whether the set contains no frames.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.infinite_from.is_none()
    }

    /// Whether the set extends to infinity.
    pub fn is_infinite(&self) -> bool {
        self.infinite_from.is_some()
    }

    /// The first frame of the infinite tail, if any.
    pub fn infinite_start(&self) -> Option<FrameTime> {
        self.infinite_from
    }

    /// The finite runs of the set, in increasing order.
    pub fn runs(&self) -> &[FrameRun] {
        &self.runs
    }

    /// The smallest frame in the set, `None` when empty.
    pub fn start(&self) -> Option<FrameTime> {
        match (self.runs.first(), self.infinite_from) {
            (Some(run), Some(inf)) => Some(run.start.min(inf)),
            (Some(run), None) => Some(run.start),
            (None, inf) => inf,
        }
    }

    /// Whether `time` belongs to the set.
    pub fn contains(&self, time: FrameTime) -> bool {
        if let Some(inf) = self.infinite_from
            && time >= inf
        {
            return true;
        }
        self.runs
            .binary_search_by(|run| {
                if time < run.start {
                    std::cmp::Ordering::Greater
                } else if time > run.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// The first time at or after `time` that is *not* in the set, or
    /// `None` when the set covers everything from `time` onwards.
    pub fn first_excluded_since(&self, time: FrameTime) -> Option<FrameTime> {
        if let Some(inf) = self.infinite_from
            && time >= inf
        {
            return None;
        }
        match self.runs.iter().find(|run| run.end >= time) {
            Some(run) if run.start <= time => {
                // Canonical form guarantees `run.end + 1` is outside every
                // other finite run and below any infinite marker.
                Some(run.end + 1)
            }
            _ => Some(time),
        }
    }

    /// Rebuild canonical form from arbitrary runs and an optional marker.
    fn normalized(mut runs: Vec<FrameRun>, mut infinite_from: Option<FrameTime>) -> Self {
        runs.sort_by_key(|run| run.start);

        let mut merged: Vec<FrameRun> = Vec::with_capacity(runs.len());
        for run in runs {
            if run.end < run.start {
                continue;
            }
            match merged.last_mut() {
                Some(prev) if run.start <= prev.end + 1 => {
                    prev.end = prev.end.max(run.end);
                }
                _ => merged.push(run),
            }
        }

        if let Some(mut inf) = infinite_from {
            // Absorb runs that reach the tail, lowering the marker.
            while let Some(last) = merged.last() {
                if last.end + 1 >= inf {
                    inf = inf.min(last.start);
                    merged.pop();
                } else {
                    break;
                }
            }
            infinite_from = Some(inf);
        }

        Self {
            runs: merged,
            infinite_from,
        }
    }

    fn union_with(&mut self, rhs: &Self) {
        let mut runs = std::mem::take(&mut self.runs);
        runs.extend_from_slice(&rhs.runs);
        let infinite_from = match (self.infinite_from, rhs.infinite_from) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        *self = Self::normalized(runs, infinite_from);
    }

    fn intersect_with(&mut self, rhs: &Self) {
        let mut out: Vec<FrameRun> = Vec::new();

        // Finite/finite overlaps: classic two-pointer sweep.
        let (mut i, mut j) = (0usize, 0usize);
        while i < self.runs.len() && j < rhs.runs.len() {
            let a = self.runs[i];
            let b = rhs.runs[j];
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if start <= end {
                out.push(FrameRun { start, end });
            }
            if a.end < b.end {
                i += 1;
            } else {
                j += 1;
            }
        }

        // Each side's finite runs against the other side's tail.
        if let Some(inf) = rhs.infinite_from {
            for run in &self.runs {
                if run.end >= inf {
                    out.push(FrameRun {
                        start: run.start.max(inf),
                        end: run.end,
                    });
                }
            }
        }
        if let Some(inf) = self.infinite_from {
            for run in &rhs.runs {
                if run.end >= inf {
                    out.push(FrameRun {
                        start: run.start.max(inf),
                        end: run.end,
                    });
                }
            }
        }

        let infinite_from = match (self.infinite_from, rhs.infinite_from) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };

        *self = Self::normalized(out, infinite_from);
    }

    fn subtract(&mut self, rhs: &Self) {
        let mut out: Vec<FrameRun> = Vec::new();

        for &run in &self.runs {
            let mut pieces = vec![run];
            for &cut in &rhs.runs {
                pieces = pieces
                    .into_iter()
                    .flat_map(|p| subtract_run(p, cut.start, Some(cut.end)))
                    .collect();
            }
            if let Some(inf) = rhs.infinite_from {
                pieces = pieces
                    .into_iter()
                    .flat_map(|p| subtract_run(p, inf, None))
                    .collect();
            }
            out.extend(pieces);
        }

        let mut infinite_from = None;
        if let Some(sm) = self.infinite_from {
            match rhs.infinite_from {
                Some(rm) if rm <= sm => {
                    // Tail removed entirely; anything of ours above `rm`
                    // was already inside rhs's tail.
                }
                Some(rm) => {
                    // Only `[sm, rm - 1]` survives; trim rhs's finite runs
                    // out of it like any other finite piece.
                    let mut pieces = vec![FrameRun {
                        start: sm,
                        end: rm - 1,
                    }];
                    for &cut in &rhs.runs {
                        pieces = pieces
                            .into_iter()
                            .flat_map(|p| subtract_run(p, cut.start, Some(cut.end)))
                            .collect();
                    }
                    out.extend(pieces);
                }
                None => {
                    // Tail survives with holes punched by rhs's finite
                    // runs; the tail restarts after the last overlap.
                    let mut cursor = sm;
                    for &cut in rhs.runs.iter().filter(|cut| cut.end >= sm) {
                        if cut.start > cursor {
                            out.push(FrameRun {
                                start: cursor,
                                end: cut.start - 1,
                            });
                        }
                        cursor = cursor.max(cut.end + 1);
                    }
                    infinite_from = Some(cursor);
                }
            }
        }

        *self = Self::normalized(out, infinite_from);
    }
}

/// Remove `[cut_start, cut_end]` (unbounded when `cut_end` is `None`)
/// from a single run: truncate left, truncate right, or split in two.
fn subtract_run(run: FrameRun, cut_start: FrameTime, cut_end: Option<FrameTime>) -> Vec<FrameRun> {
    let cut_end_eff = cut_end.unwrap_or(FrameTime::MAX);
    if cut_end_eff < run.start || cut_start > run.end {
        return vec![run];
    }
    let mut out = Vec::with_capacity(2);
    if cut_start > run.start {
        out.push(FrameRun {
            start: run.start,
            end: cut_start - 1,
        });
    }
    if let Some(ce) = cut_end
        && ce < run.end
    {
        out.push(FrameRun {
            start: ce + 1,
            end: run.end,
        });
    }
    out
}

impl std::ops::BitOr for FrameSet {
    type Output = FrameSet;

    fn bitor(mut self, rhs: FrameSet) -> FrameSet {
        self.union_with(&rhs);
        self
    }
}

impl std::ops::BitOrAssign for FrameSet {
    fn bitor_assign(&mut self, rhs: FrameSet) {
        self.union_with(&rhs);
    }
}

impl std::ops::BitAnd for FrameSet {
    type Output = FrameSet;

    fn bitand(mut self, rhs: FrameSet) -> FrameSet {
        self.intersect_with(&rhs);
        self
    }
}

impl std::ops::BitAndAssign for FrameSet {
    fn bitand_assign(&mut self, rhs: FrameSet) {
        self.intersect_with(&rhs);
    }
}

impl std::ops::Sub for FrameSet {
    type Output = FrameSet;

    fn sub(mut self, rhs: FrameSet) -> FrameSet {
        self.subtract(&rhs);
        self
    }
}

impl std::ops::SubAssign for FrameSet {
    fn sub_assign(&mut self, rhs: FrameSet) {
        self.subtract(&rhs);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/interval/set.rs"]
mod tests;
