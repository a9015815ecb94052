//! The orchestrator data collaborator.
//!
//! The orchestrator owns ports, subnets, networks and routers. This daemon
//! only reads them, with the exception of dynamic VLAN segments which the
//! orchestrator allocates on request.

use std::net::IpAddr;

use async_trait::async_trait;
use fabric_types::{DeviceOwnerClass, GatewayCidr, PortStatus, SegmentId, SegmentType, VlanId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for orchestrator queries.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors returned by the orchestrator collaborator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A referenced object does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Object kind (e.g., "subnet", "router").
        kind: String,
        /// Object id.
        id: String,
    },

    /// The orchestrator could not be queried.
    #[error("Orchestrator unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },
}

impl OrchestratorError {
    /// Creates a not found error.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// A port as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub network_id: String,
    pub project_id: String,
    /// Raw device owner string (e.g., "compute:nova", "network:dhcp").
    pub device_owner: String,
    /// Binding host; empty when unbound.
    pub host_id: String,
    pub status: PortStatus,
}

impl Port {
    pub fn owner_class(&self) -> DeviceOwnerClass {
        DeviceOwnerClass::from_device_owner(&self.device_owner)
    }
}

/// Segments a port is bound through: the overlay segment at the top and
/// the dynamic VLAN segment towards the leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSegments {
    pub overlay: SegmentId,
    pub vlan: VlanId,
    pub physical_network: String,
}

/// A port lifecycle event.
///
/// `original` and `original_segments` describe the port before an update
/// and are empty for create and delete events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEvent {
    pub port: Port,
    pub segments: Option<PortSegments>,
    pub original: Option<Port>,
    pub original_segments: Option<PortSegments>,
}

impl PortEvent {
    /// An event for a port without a previous state.
    pub fn new(port: Port, segments: Option<PortSegments>) -> Self {
        Self {
            port,
            segments,
            original: None,
            original_segments: None,
        }
    }

    /// Adds the state before an update.
    pub fn with_original(mut self, original: Port, segments: Option<PortSegments>) -> Self {
        self.original = Some(original);
        self.original_segments = segments;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    /// Subnet CIDR, e.g. "10.10.10.0/24".
    pub cidr: String,
    pub gateway_ip: Option<IpAddr>,
}

impl Subnet {
    /// Gateway address with the subnet prefix length, if the subnet has one.
    pub fn gateway_cidr(&self) -> Option<GatewayCidr> {
        self.gateway_ip
            .and_then(|ip| GatewayCidr::from_subnet(ip, &self.cidr).ok())
    }

    /// `ip` with the subnet prefix length.
    pub fn address_cidr(&self, ip: IpAddr) -> Option<GatewayCidr> {
        GatewayCidr::from_subnet(ip, &self.cidr).ok()
    }

    pub fn is_ipv6(&self) -> bool {
        self.cidr.contains(':')
    }
}

/// The static segment of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSegment {
    pub network_id: String,
    pub segment_type: SegmentType,
    pub physical_network: Option<String>,
    pub segmentation_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalGateway {
    pub network_id: String,
    pub subnet_id: String,
    /// Router address on the external subnet.
    pub fixed_ip: IpAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    pub project_id: String,
    pub external_gateway: Option<ExternalGateway>,
}

/// A router port on a tenant subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterInterface {
    pub router_id: String,
    pub subnet_id: String,
    pub network_id: String,
    pub project_id: String,
}

/// A VLAN segment the orchestrator allocated for a network on one
/// physical network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSegment {
    pub network_id: String,
    pub physical_network: String,
    pub vlan: VlanId,
}

/// Port query filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFilter {
    /// Binding hosts to match; empty matches none.
    pub host_ids: Vec<String>,
    pub subnet_id: String,
}

/// Read access to orchestrator state.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Ports bound to any of the hosts with an address on the subnet.
    async fn list_ports(&self, filter: &PortFilter) -> OrchestratorResult<Vec<Port>>;

    async fn subnet(&self, subnet_id: &str) -> OrchestratorResult<Option<Subnet>>;

    async fn subnets_for_network(&self, network_id: &str) -> OrchestratorResult<Vec<Subnet>>;

    async fn network_segment(&self, network_id: &str)
        -> OrchestratorResult<Option<NetworkSegment>>;

    async fn router(&self, router_id: &str) -> OrchestratorResult<Option<Router>>;

    /// Ids of every router the orchestrator knows.
    async fn router_ids(&self) -> OrchestratorResult<Vec<String>>;

    /// Ids of every network the orchestrator knows.
    async fn network_ids(&self) -> OrchestratorResult<Vec<String>>;

    /// The router interface on the subnet, if the subnet is routed.
    async fn router_interface_for_subnet(
        &self,
        subnet_id: &str,
    ) -> OrchestratorResult<Option<RouterInterface>>;

    /// Allocates (or returns the existing) dynamic VLAN segment for the
    /// network on a physical network.
    async fn allocate_dynamic_segment(
        &self,
        network_id: &str,
        physical_network: &str,
    ) -> OrchestratorResult<Option<DynamicSegment>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn subnet(cidr: &str, gateway: Option<&str>) -> Subnet {
        Subnet {
            id: "s1".to_string(),
            network_id: "n1".to_string(),
            cidr: cidr.to_string(),
            gateway_ip: gateway.map(|g| g.parse().unwrap()),
        }
    }

    #[test]
    fn test_gateway_cidr() {
        let s = subnet("10.10.10.0/24", Some("10.10.10.1"));
        assert_eq!(s.gateway_cidr().unwrap().to_string(), "10.10.10.1/24");
        assert_eq!(
            s.address_cidr("10.10.10.9".parse().unwrap())
                .unwrap()
                .to_string(),
            "10.10.10.9/24"
        );
        assert!(!s.is_ipv6());
    }

    #[test]
    fn test_no_gateway() {
        assert_eq!(subnet("10.10.10.0/24", None).gateway_cidr(), None);
        assert!(subnet("2001:db8::/64", None).is_ipv6());
    }

    #[test]
    fn test_port_owner_class() {
        let port = Port {
            id: "p1".to_string(),
            network_id: "n1".to_string(),
            project_id: "t1".to_string(),
            device_owner: "network:dhcp".to_string(),
            host_id: "compute1".to_string(),
            status: PortStatus::Active,
        };
        assert!(port.owner_class().is_dhcp());
    }
}
