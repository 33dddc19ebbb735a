// src/interval.rs

/// A closed integer range, always stored with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        (self.end - self.start) as u64 + 1
    }
}

/// A bag of intervals whose covered length is computed lazily by sorting
/// and merging. Every insertion invalidates the cached value.
#[derive(Debug, Clone, Default)]
pub struct IntervalList {
    intervals: Vec<Interval>,
    covered: Option<u64>,
}

impl IntervalList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, a: u32, b: u32) {
        self.intervals.push(Interval::new(a, b));
        self.covered = None;
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
        self.covered = Some(0);
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Number of positions covered by at least one interval.
    pub fn covered_length(&mut self) -> u64 {
        if let Some(covered) = self.covered {
            return covered;
        }
        self.merge_overlapping();
        let covered = self.intervals.iter().map(Interval::len).sum();
        self.covered = Some(covered);
        covered
    }

    /// Sorts and merges overlapping or abutting intervals in place.
    fn merge_overlapping(&mut self) {
        if self.intervals.len() < 2 {
            return;
        }
        self.intervals.sort_unstable();
        let mut merged: Vec<Interval> = Vec::with_capacity(self.intervals.len());
        for interval in self.intervals.drain(..) {
            match merged.last_mut() {
                Some(last) if interval.start <= last.end.saturating_add(1) => {
                    last.end = last.end.max(interval.end);
                }
                _ => merged.push(interval),
            }
        }
        self.intervals = merged;
    }
}
