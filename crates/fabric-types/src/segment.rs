//! Overlay segment identifier.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Overlay segment identifier (VNI-equivalent), 24 bits wide.
///
/// Both L2 (network) and L3 (router) segments share this representation;
/// the pool a segment came from is tracked by the allocator, not the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SegmentId(u32);

impl SegmentId {
    /// Minimum valid segment ID.
    pub const MIN: u32 = 1;

    /// Maximum segment ID supported by the 24-bit overlay encoding.
    pub const MAX: u32 = (1 << 24) - 1;

    /// Creates a new segment ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is 0 or does not fit in 24 bits.
    pub const fn new(id: u32) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(SegmentId(id))
        } else {
            Err(ParseError::InvalidSegmentId(id))
        }
    }

    /// Returns the raw segment ID.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SegmentId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u32 = s
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidSegmentId(0))?;
        SegmentId::new(id)
    }
}

impl TryFrom<u32> for SegmentId {
    type Error = ParseError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        SegmentId::new(id)
    }
}

impl From<SegmentId> for u32 {
    fn from(segment: SegmentId) -> u32 {
        segment.0
    }
}
