//! Deterministic partitioning of an index range into per-worker sub-ranges.
//!
//! The pool never decides sizes at run time: the split is a pure function of
//! the bounds and the worker count, so callers can predict which indices
//! travel together.

use serde::Serialize;

/// Half-open slice `[start, end)` of a parallel loop, run by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubRange {
    pub start: usize,
    pub end: usize,
}

impl SubRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `[lower, upper)` into up to `parts` contiguous sub-ranges in index order.
/// Sizes differ by at most one; earlier sub-ranges take the remainder.
/// An empty range (including `upper < lower`) or `parts == 0` yields nothing.
///
/// # Example
/// ```
/// # use parloop::parallel::{sub_ranges, SubRange};
/// let ranges = sub_ranges(0, 10, 3);
/// assert_eq!(
///     ranges,
///     vec![SubRange::new(0, 4), SubRange::new(4, 7), SubRange::new(7, 10)]
/// );
/// ```
pub fn sub_ranges(lower: usize, upper: usize, parts: usize) -> Vec<SubRange> {
    let total = upper.saturating_sub(lower);
    if total == 0 || parts == 0 {
        return Vec::new();
    }
    let parts = parts.min(total);
    let base = total / parts;
    let remainder = total % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = lower;
    for i in 0..parts {
        let size = base + usize::from(i < remainder);
        let end = start + size;
        ranges.push(SubRange::new(start, end));
        start = end;
    }
    ranges
}
