//! Common types for synchronizing an overlay fabric with a cloud orchestrator.
//!
//! This crate provides type-safe representations of the identifiers and
//! classifications exchanged between the orchestrator, the allocation store
//! and the fabric controller:
//!
//! - [`SegmentId`]: overlay segment identifiers (VNI-equivalent)
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`IdRange`] / [`RangeSet`]: operator-configured `min:max` ranges
//! - [`PoolBounds`]: global bounds a pool's ranges must respect
//! - [`DeviceOwnerClass`], [`SegmentType`], [`PortStatus`]: orchestrator
//!   strings decided once at the boundary
//! - [`GatewayCidr`]: `gateway_ip/prefix_len` as pushed to switches

mod gateway;
mod owner;
mod range;
mod segment;
mod vlan;

pub use gateway::GatewayCidr;
pub use owner::{DeviceOwnerClass, PortStatus, SegmentType};
pub use range::{parse_ranges, IdRange, PoolBounds, RangeSet, MAX_POOL_SIZE};
pub use segment::SegmentId;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid range '{entry}': {reason}")]
    InvalidRange { entry: String, reason: String },

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u32),

    #[error("invalid segment ID: {0} (must be 1-16777215)")]
    InvalidSegmentId(u32),

    #[error("invalid gateway CIDR: {0}")]
    InvalidGatewayCidr(String),
}

impl ParseError {
    /// Creates an invalid range error.
    pub fn invalid_range(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}
