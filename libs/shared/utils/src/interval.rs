//! Half-open interval arithmetic shared by slot generation and booking.
//!
//! Intervals are `[start, end)`. Anything with a total order works: absolute
//! timestamps for appointments, `NaiveTime` for within-day windows.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval<T> {
    pub start: T,
    pub end: T,
}

impl<T: Ord + Copy> Interval<T> {
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    /// An interval whose end does not come after its start holds no instant.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &Interval<T>) -> bool {
        overlaps(self, other)
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Interval<T>) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// `[a1, a2)` and `[b1, b2)` overlap iff `a1 < b2 && b1 < a2`.
pub fn overlaps<T: Ord>(a: &Interval<T>, b: &Interval<T>) -> bool {
    a.start < b.end && b.start < a.end
}

/// True when `candidate` overlaps any interval in `others`.
pub fn overlaps_any<'a, T, I>(candidate: &Interval<T>, others: I) -> bool
where
    T: Ord + 'a,
    I: IntoIterator<Item = &'a Interval<T>>,
{
    others.into_iter().any(|other| overlaps(candidate, other))
}
