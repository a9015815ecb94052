//! VLAN ID type with validation.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// IEEE 802.1Q VLAN identifier (1-4094).
///
/// VLAN 0 and VLAN 4095 are reserved, so neither can be allocated from a
/// border-leaf pool or pushed as a trunk tag.
///
/// # Examples
///
/// ```
/// use fabric_types::VlanId;
///
/// let vlan = VlanId::new(2000).unwrap();
/// assert_eq!(vlan.as_u16(), 2000);
///
/// assert!(VlanId::new(0).is_err());
/// assert!(VlanId::new(4095).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VlanId(u16);

impl VlanId {
    /// Minimum valid VLAN ID.
    pub const MIN: u16 = 1;

    /// Maximum valid VLAN ID.
    pub const MAX: u16 = 4094;

    /// Creates a new VLAN ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the VLAN ID is not in the valid range (1-4094).
    pub const fn new(id: u32) -> Result<Self, ParseError> {
        if id >= Self::MIN as u32 && id <= Self::MAX as u32 {
            Ok(VlanId(id as u16))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    /// Returns the VLAN ID as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the VLAN ID widened to u32, the width used by the pools.
    pub const fn as_u32(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the switch-side "Vlan100" interface form too
        let id_str = match s.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("vlan") => &s[4..],
            _ => s,
        };

        let id: u32 = id_str.parse().map_err(|_| ParseError::InvalidVlanId(0))?;

        VlanId::new(id)
    }
}

impl TryFrom<u32> for VlanId {
    type Error = ParseError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u32 {
    fn from(vlan: VlanId) -> u32 {
        vlan.as_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_vlan_ids() {
        assert!(VlanId::new(1).is_ok());
        assert!(VlanId::new(2000).is_ok());
        assert!(VlanId::new(4094).is_ok());
    }

    #[test]
    fn test_invalid_vlan_ids() {
        assert_eq!(VlanId::new(0), Err(ParseError::InvalidVlanId(0)));
        assert!(VlanId::new(4095).is_err());
        assert!(VlanId::new(70_000).is_err());
    }

    #[test]
    fn test_parse_vlan_prefix() {
        let vlan: VlanId = "Vlan100".parse().unwrap();
        assert_eq!(vlan.as_u16(), 100);

        let vlan2: VlanId = "200".parse().unwrap();
        assert_eq!(vlan2.as_u32(), 200);
    }

    #[test]
    fn test_try_from_and_display() {
        assert!(VlanId::try_from(4095).is_err());
        let vlan = VlanId::try_from(10).unwrap();
        assert_eq!(vlan.to_string(), "10");
        assert_eq!(u32::from(vlan), 10);
    }

    #[test]
    fn test_parse_garbage() {
        assert!("VlanX".parse::<VlanId>().is_err());
        assert!("".parse::<VlanId>().is_err());
    }
}
