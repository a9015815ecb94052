//! Immutable switch configuration requests.
//!
//! The switch IP selects the target device and is not part of the JSON
//! body; everything else is sent as-is.

use fabric_types::{GatewayCidr, SegmentId, VlanId};
use serde::Serialize;

/// L2 configuration of one switch: VLAN to segment mapping on a set of
/// trunk interfaces, plus the gateway address of the subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct L2Request {
    #[serde(skip)]
    pub switch_ip: String,
    pub project_id: String,
    pub network_id: String,
    /// Set on border-leaf gateway pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_id: Option<String>,
    pub vni: SegmentId,
    pub vlan_id: VlanId,
    pub interfaces: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gw_ip: Option<GatewayCidr>,
}

/// Which fabric call family a VRF request maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VrfMode {
    /// First interface of the router on this switch: create the VRF.
    CreateVrf,
    /// The VRF exists: attach one more VLAN interface.
    AttachInterface,
    /// Last interface of the router on this switch: delete the VRF.
    DeleteVrf,
    /// Other interfaces remain: detach this VLAN interface only.
    DetachInterface,
}

impl VrfMode {
    /// Push-side mode for a switch that does or does not already carry
    /// the router.
    pub fn for_push(vrf_exists: bool) -> Self {
        if vrf_exists {
            Self::AttachInterface
        } else {
            Self::CreateVrf
        }
    }

    /// Retract-side mode for a binding that is or is not the router's last
    /// one on the switch.
    pub fn for_retract(last_interface: bool) -> Self {
        if last_interface {
            Self::DeleteVrf
        } else {
            Self::DetachInterface
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(self, Self::CreateVrf | Self::AttachInterface)
    }

    /// Device action path segment.
    pub fn action(&self) -> &'static str {
        match self {
            Self::CreateVrf => "neutron_create_router",
            Self::AttachInterface => "neutron_create_router_interface",
            Self::DeleteVrf => "neutron_delete_router",
            Self::DetachInterface => "neutron_delete_router_interface",
        }
    }
}

/// VRF configuration of one switch: binds a router's L3 segment to a VLAN
/// interface with the gateway address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VrfRequest {
    #[serde(skip)]
    pub switch_ip: String,
    #[serde(skip)]
    pub mode: VrfMode,
    pub project_id: String,
    pub network_id: String,
    pub router_id: String,
    pub router_vni: SegmentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l2_vni: Option<SegmentId>,
    pub vlan_id: VlanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gw_ip: Option<GatewayCidr>,
    /// Default route towards an external gateway on a border leaf.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub if_ext_gw: bool,
}

impl VrfRequest {
    /// The same request with a different mode.
    pub fn with_mode(&self, mode: VrfMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_l2_body() {
        let request = L2Request {
            switch_ip: "192.168.4.105".to_string(),
            project_id: "p1".to_string(),
            network_id: "n1".to_string(),
            router_id: None,
            vni: SegmentId::new(10008).unwrap(),
            vlan_id: VlanId::new(105).unwrap(),
            interfaces: vec!["X37".to_string()],
            gw_ip: Some("10.10.10.1/24".parse().unwrap()),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "project_id": "p1",
                "network_id": "n1",
                "vni": 10008,
                "vlan_id": 105,
                "interfaces": ["X37"],
                "gw_ip": "10.10.10.1/24"
            })
        );
    }

    #[test]
    fn test_vrf_body_external_gateway() {
        let request = VrfRequest {
            switch_ip: "192.168.4.105".to_string(),
            mode: VrfMode::CreateVrf,
            project_id: "p1".to_string(),
            network_id: "ext".to_string(),
            router_id: "r1".to_string(),
            router_vni: SegmentId::new(100).unwrap(),
            l2_vni: None,
            vlan_id: VlanId::new(2000).unwrap(),
            gw_ip: Some("172.16.0.1/24".parse().unwrap()),
            if_ext_gw: true,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["if_ext_gw"], json!(true));
        assert_eq!(body["router_vni"], json!(100));
        assert!(body.get("l2_vni").is_none());
        assert!(body.get("mode").is_none());

        let interface = request.with_mode(VrfMode::AttachInterface);
        let body = serde_json::to_value(&interface.with_mode(VrfMode::DetachInterface)).unwrap();
        assert_eq!(body["router_id"], json!("r1"));
    }

    #[test]
    fn test_vrf_modes() {
        assert_eq!(VrfMode::for_push(false), VrfMode::CreateVrf);
        assert_eq!(VrfMode::for_push(true), VrfMode::AttachInterface);
        assert_eq!(VrfMode::for_retract(true), VrfMode::DeleteVrf);
        assert_eq!(VrfMode::for_retract(false), VrfMode::DetachInterface);
        assert!(VrfMode::AttachInterface.is_push());
        assert!(!VrfMode::DeleteVrf.is_push());
        assert_eq!(
            VrfMode::DetachInterface.action(),
            "neutron_delete_router_interface"
        );
    }
}
