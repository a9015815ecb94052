//! Classification of orchestrator strings.
//!
//! Device owners, network types and port statuses arrive as free-form
//! strings; they are decided once here and carried as closed enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of the entity that owns a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOwnerClass {
    Compute,
    Baremetal,
    Manila,
    Dhcp,
    RouterInterface,
    RouterGateway,
    RouterHaInterface,
    Other,
}

impl DeviceOwnerClass {
    /// Classifies an orchestrator `device_owner` string
    /// (`"compute:nova"`, `"network:dhcp"`, ...).
    pub fn from_device_owner(owner: &str) -> Self {
        match owner {
            "network:dhcp" => Self::Dhcp,
            "network:router_interface" => Self::RouterInterface,
            "network:router_gateway" => Self::RouterGateway,
            "network:router_ha_interface" => Self::RouterHaInterface,
            o if o.starts_with("compute") => Self::Compute,
            o if o.starts_with("baremetal") => Self::Baremetal,
            o if o.starts_with("manila") => Self::Manila,
            _ => Self::Other,
        }
    }

    /// Ports of these owners drive switch configuration.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other)
    }

    /// DHCP ports never keep a subnet alive on a switch.
    pub fn is_dhcp(&self) -> bool {
        matches!(self, Self::Dhcp)
    }
}

/// Network segment type as far as this fabric is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    /// Overlay segment allocated from the L2 pool.
    TenantOverlay,
    /// Purpose-built external network terminated on border leaves.
    ExternalNet,
    /// Plain VLAN segment (dynamic host-facing segments).
    Vlan,
    Other,
}

impl SegmentType {
    /// Network type string of tenant overlay segments.
    pub const TENANT_OVERLAY: &'static str = "aster_vxlan";

    /// Network type string of external segments.
    pub const EXTERNAL_NET: &'static str = "aster_ext_net";

    /// Classifies an orchestrator `network_type` string.
    pub fn from_network_type(network_type: &str) -> Self {
        match network_type {
            Self::TENANT_OVERLAY => Self::TenantOverlay,
            Self::EXTERNAL_NET => Self::ExternalNet,
            "vlan" => Self::Vlan,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TenantOverlay => Self::TENANT_OVERLAY,
            Self::ExternalNet => Self::EXTERNAL_NET,
            Self::Vlan => "vlan",
            Self::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// Operational status of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortStatus {
    Active,
    Build,
    Down,
    Error,
}

impl PortStatus {
    /// Parses an orchestrator status string; unknown values count as `Build`.
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "DOWN" => Self::Down,
            "ERROR" => Self::Error,
            _ => Self::Build,
        }
    }

    /// DOWN and ERROR both tear configuration down.
    pub fn is_down(&self) -> bool {
        matches!(self, Self::Down | Self::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_device_owner_classes() {
        assert_eq!(
            DeviceOwnerClass::from_device_owner("compute:nova"),
            DeviceOwnerClass::Compute
        );
        assert_eq!(
            DeviceOwnerClass::from_device_owner("baremetal:none"),
            DeviceOwnerClass::Baremetal
        );
        assert_eq!(
            DeviceOwnerClass::from_device_owner("manila:share"),
            DeviceOwnerClass::Manila
        );
        assert_eq!(
            DeviceOwnerClass::from_device_owner("network:dhcp"),
            DeviceOwnerClass::Dhcp
        );
        assert_eq!(
            DeviceOwnerClass::from_device_owner("network:router_ha_interface"),
            DeviceOwnerClass::RouterHaInterface
        );
        assert_eq!(
            DeviceOwnerClass::from_device_owner("network:floatingip"),
            DeviceOwnerClass::Other
        );
    }

    #[test]
    fn test_supported_owners() {
        assert!(DeviceOwnerClass::Compute.is_supported());
        assert!(DeviceOwnerClass::RouterGateway.is_supported());
        assert!(!DeviceOwnerClass::Other.is_supported());
        assert!(DeviceOwnerClass::Dhcp.is_dhcp());
    }

    #[test]
    fn test_segment_types() {
        assert_eq!(
            SegmentType::from_network_type("aster_vxlan"),
            SegmentType::TenantOverlay
        );
        assert_eq!(
            SegmentType::from_network_type("aster_ext_net"),
            SegmentType::ExternalNet
        );
        assert_eq!(SegmentType::from_network_type("vlan"), SegmentType::Vlan);
        assert_eq!(SegmentType::from_network_type("flat"), SegmentType::Other);
        assert_eq!(SegmentType::ExternalNet.to_string(), "aster_ext_net");
    }

    #[test]
    fn test_port_status() {
        assert!(PortStatus::parse("DOWN").is_down());
        assert!(PortStatus::parse("error").is_down());
        assert!(!PortStatus::parse("ACTIVE").is_down());
        assert_eq!(PortStatus::parse("whatever"), PortStatus::Build);
    }
}
