//! Logical byte ranges and part-boundary normalization.
//!
//! Offsets are signed: a buffer's logical space extends in both directions
//! and parts may start at negative offsets. Normalization therefore uses
//! true floor division (`div_euclid`), which rounds toward negative
//! infinity; truncating division would misplace every boundary left of
//! zero and break the partition invariant.

/// Half-open span `[start, end)` of logical byte offsets.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ByteRange {
    pub start: i64,
    pub end: i64,
}

impl ByteRange {
    pub fn new(start: i64, end: i64) -> Self {
        debug_assert!(start <= end, "inverted range [{start}, {end})");
        Self { start, end }
    }

    pub fn with_len(start: i64, len: usize) -> Self {
        Self::new(start, start + len as i64)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).max(0) as usize
    }

    pub fn contains(&self, offset: i64) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn contains_range(&self, other: ByteRange) -> bool {
        other.is_empty() || (self.start <= other.start && other.end <= self.end)
    }

    /// Overlap of two ranges; empty when they are disjoint.
    pub fn intersect(&self, other: ByteRange) -> ByteRange {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        ByteRange {
            start,
            end: end.max(start),
        }
    }

    /// Smallest range covering both inputs; empty inputs are ignored.
    pub fn cover(&self, other: ByteRange) -> ByteRange {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return *self;
        }
        ByteRange::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Greatest part boundary at or below `offset`.
pub fn align_down(offset: i64, part_size: usize) -> i64 {
    let part = part_size as i64;
    offset.div_euclid(part) * part
}

/// Expands a non-empty range outward to the enclosing part grid: the start
/// floors to its boundary, the end becomes the boundary of the last covered
/// offset plus one part.
pub fn align_range(range: ByteRange, part_size: usize) -> ByteRange {
    debug_assert!(!range.is_empty());
    let start = align_down(range.start, part_size);
    let end = align_down(range.end - 1, part_size) + part_size as i64;
    ByteRange { start, end }
}
