//! Operator-configured identifier ranges.
//!
//! Ranges are written as `"min:max"` tokens, optionally several per string
//! separated by commas (`"100:200,300:310"`). Every id in a range must lie
//! inside the [`PoolBounds`] of the pool it configures.

use crate::{ParseError, SegmentId, VlanId};
use std::fmt;

/// Largest number of ids a single pool (or a single switch's VLAN pool)
/// may expand to.
pub const MAX_POOL_SIZE: u64 = 1_000_000;

/// Global bounds that configured ranges of one pool must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBounds {
    /// Pool name used in error messages.
    pub name: &'static str,
    /// Smallest id the pool may contain.
    pub min: u32,
    /// Largest id the pool may contain.
    pub max: u32,
}

impl PoolBounds {
    /// L2 overlay segments start above the VLAN space (max VLAN + 2).
    pub const L2_SEGMENT: PoolBounds = PoolBounds {
        name: "l2_segment",
        min: VlanId::MAX as u32 + 2,
        max: SegmentId::MAX,
    };

    /// L3 overlay segments may use the whole 24-bit space.
    pub const L3_SEGMENT: PoolBounds = PoolBounds {
        name: "l3_segment",
        min: SegmentId::MIN,
        max: SegmentId::MAX,
    };

    /// Border-leaf VLAN pools.
    pub const BORDER_VLAN: PoolBounds = PoolBounds {
        name: "border_vlan",
        min: VlanId::MIN as u32,
        max: VlanId::MAX as u32,
    };
}

/// Inclusive `min..=max` range of identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdRange {
    pub min: u32,
    pub max: u32,
}

impl IdRange {
    /// Creates a new range, rejecting `max < min`.
    pub fn new(min: u32, max: u32) -> Result<Self, ParseError> {
        if max < min {
            return Err(ParseError::invalid_range(
                format!("{}:{}", min, max),
                "max is smaller than min",
            ));
        }
        Ok(Self { min, max })
    }

    /// Number of ids in the range.
    pub fn len(&self) -> u64 {
        u64::from(self.max) - u64::from(self.min) + 1
    }

    /// A range always holds at least one id.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if `id` lies inside the range.
    pub fn contains(&self, id: u32) -> bool {
        id >= self.min && id <= self.max
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.min, self.max)
    }
}

/// Normalized set of ranges: sorted, non-overlapping, non-adjacent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<IdRange>,
}

impl RangeSet {
    /// Builds a set from arbitrary ranges, merging overlaps.
    pub fn from_ranges(mut ranges: Vec<IdRange>) -> Self {
        ranges.sort();
        let mut merged: Vec<IdRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if u64::from(range.min) <= u64::from(last.max) + 1 => {
                    last.max = last.max.max(range.max);
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    /// The merged ranges, ascending.
    pub fn ranges(&self) -> &[IdRange] {
        &self.ranges
    }

    /// Returns true if `id` falls in any range.
    pub fn contains(&self, id: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(id))
    }

    /// Total number of ids covered.
    pub fn len(&self) -> u64 {
        self.ranges.iter().map(IdRange::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterates every id covered, ascending.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.min..=r.max)
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ranges.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

fn parse_bound(entry: &str, raw: &str) -> Result<u32, ParseError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ParseError::invalid_range(entry, format!("'{}' is not an integer", raw.trim())))
}

/// Parses `"min:max"` tokens into a [`RangeSet`] bounded by `bounds`.
///
/// Each string may hold several comma-separated tokens; blank tokens are
/// ignored.
///
/// # Errors
///
/// Fails if a token is not two integers separated by `:`, if `max < min`,
/// if an id falls outside `bounds`, or if the set expands to more than
/// [`MAX_POOL_SIZE`] ids.
pub fn parse_ranges<S: AsRef<str>>(lines: &[S], bounds: PoolBounds) -> Result<RangeSet, ParseError> {
    let mut ranges = Vec::new();

    for line in lines {
        for entry in line.as_ref().split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }

            let (lo, hi) = entry
                .split_once(':')
                .ok_or_else(|| ParseError::invalid_range(entry, "expected 'min:max'"))?;
            let range = IdRange::new(parse_bound(entry, lo)?, parse_bound(entry, hi)?)
                .map_err(|_| ParseError::invalid_range(entry, "max is smaller than min"))?;

            if range.min < bounds.min || range.max > bounds.max {
                return Err(ParseError::invalid_range(
                    entry,
                    format!(
                        "{} ids must lie within {}:{}",
                        bounds.name, bounds.min, bounds.max
                    ),
                ));
            }
            ranges.push(range);
        }
    }

    let set = RangeSet::from_ranges(ranges);
    if set.len() > MAX_POOL_SIZE {
        return Err(ParseError::invalid_range(
            set.to_string(),
            format!(
                "{} pool expands to {} ids (limit {})",
                bounds.name,
                set.len(),
                MAX_POOL_SIZE
            ),
        ));
    }
    Ok(set)
}
