//! Interval overlap set used by the partition intersection heuristic

/// Result of inserting an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// No previously inserted interval intersects the new one
    Disjoint,
    /// The new interval intersects the interval inserted at this index
    Intersects(usize),
}

/// Set of half-open `[start, start + length)` intervals
///
/// Every interval is kept, even one that overlaps, so later insertions are
/// checked against the whole history. When several earlier intervals
/// intersect, the most recently inserted one is reported.
///
/// Two intervals with the same start always intersect, including empty ones;
/// an empty interval at a distinct start intersects nothing.
#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    intervals: Vec<(u64, u64)>,
}

impl IntervalSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `[start, start + length)` against every stored interval, then store it
    pub fn insert_and_check(&mut self, start: u64, length: u64) -> Overlap {
        let result = self
            .intervals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, &(s, l))| Self::intersects(start, length, s, l))
            .map_or(Overlap::Disjoint, |(index, _)| Overlap::Intersects(index));

        self.intervals.push((start, length));
        result
    }

    /// Number of stored intervals
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Check if no intervals are stored
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    fn intersects(a_start: u64, a_len: u64, b_start: u64, b_len: u64) -> bool {
        // Ends saturate: a hostile length cannot wrap below its start
        if a_start > b_start {
            b_start.saturating_add(b_len) > a_start
        } else if a_start < b_start {
            a_start.saturating_add(a_len) > b_start
        } else {
            true
        }
    }
}
