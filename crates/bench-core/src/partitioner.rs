//! Work partitioning for the branch key space.
//!
//! Splits a contiguous range of branch ids across processes and jobs so that
//! concurrent workers touch disjoint branches whenever the range is large enough.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Inclusive, non-empty slice of the branch id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BidRange {
    pub from: i64,
    pub to: i64,
}

impl BidRange {
    /// Create a range, rejecting `from > to`.
    pub fn new(from: i64, to: i64) -> Result<Self> {
        if from > to {
            return Err(BenchError::InvalidArgument(format!(
                "bid range start {from} is greater than end {to}"
            )));
        }
        Ok(Self { from, to })
    }

    /// Number of branch ids in the range.
    pub fn len(&self) -> i64 {
        self.to - self.from + 1
    }

    /// Always false; a `BidRange` holds at least one id.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, bid: i64) -> bool {
        (self.from..=self.to).contains(&bid)
    }
}

impl fmt::Display for BidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Split `[start, end]` into exactly `count` non-empty ranges.
///
/// When `count` does not exceed the range size, the ranges are contiguous,
/// pairwise disjoint and cover `[start, end]`; slice `i` starts at
/// `start + floor(i * size / count)` and the last slice absorbs the remainder.
///
/// When `count` exceeds the range size, every slice is a single element
/// `start + floor(i * size / count)`, so some elements are shared by several
/// slices. Callers must tolerate that overlap.
pub fn split(start: i64, end: i64, count: usize) -> Result<Vec<BidRange>> {
    if count == 0 {
        return Err(BenchError::InvalidArgument(
            "partition count must be at least 1".to_string(),
        ));
    }
    if start > end {
        return Err(BenchError::InvalidArgument(format!(
            "range start {start} is greater than end {end}"
        )));
    }

    let size = (end as i128) - (start as i128) + 1;
    let parts = count as i128;
    // floor(i * size / count) is exact in integer arithmetic
    let offset = |i: i128| (start as i128 + i * size / parts) as i64;

    let ranges = if parts <= size {
        (0..parts)
            .map(|i| {
                let from = offset(i);
                let to = if i == parts - 1 {
                    end
                } else {
                    offset(i + 1) - 1
                };
                BidRange { from, to }
            })
            .collect()
    } else {
        (0..parts)
            .map(|i| {
                let bid = offset(i);
                BidRange { from: bid, to: bid }
            })
            .collect()
    };

    Ok(ranges)
}

/// Split an existing range.
pub fn split_range(range: BidRange, count: usize) -> Result<Vec<BidRange>> {
    split(range.from, range.to, count)
}

/// Describe the partitioning plan for logging.
pub fn describe_ranges(label: &str, ranges: &[BidRange]) -> String {
    let mut lines = Vec::with_capacity(ranges.len() + 1);
    lines.push(format!("{label} distribution:"));
    for (i, range) in ranges.iter().enumerate() {
        lines.push(format!(
            "  {label}-{}: bids {range} ({} branches)",
            i + 1,
            range.len()
        ));
    }
    lines.join("\n")
}
