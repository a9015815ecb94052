//! Test doubles for the orchestrator and the fabric controller.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fabric_client::{FabricApi, FabricError, FabricResult, L2Request, VrfRequest};
use fabric_store::DatabaseConfig;
use fabric_types::{PortStatus, SegmentId, SegmentType, VlanId};
use fabricsyncd::{
    DynamicSegment, FabricSync, FabricSyncConfig, NetworkSegment, Orchestrator,
    OrchestratorError, OrchestratorResult, Port, PortEvent, PortFilter, PortSegments, Router, RouterInterface,
    Subnet,
};
use tempfile::TempDir;

pub const LEAF: &str = "10.0.0.1";
pub const OTHER_LEAF: &str = "10.0.0.2";
pub const BORDER: &str = "10.0.0.9";

pub const CONFIG: &str = r#"
[pools]
l2_segment_ranges = ["10000:10009"]
l3_segment_ranges = ["100:101"]

[leaf_switches."10.0.0.1"]
physnet = "provider"
host_ports_mapping = { compute1 = ["X25"], compute2 = ["X29"] }

[leaf_switches."10.0.0.2"]
physnet = "storage"
host_ports_mapping = { compute1 = ["X1"] }

[border_switches."10.0.0.9"]
vlan_ranges = ["2000:2002"]
physical_network_ports_mapping = { P = ["X27", "X28"] }
"#;

#[derive(Default)]
struct OrchestratorState {
    /// Port with the subnet it has an address on.
    ports: Vec<(Port, String)>,
    subnets: BTreeMap<String, Subnet>,
    segments: BTreeMap<String, NetworkSegment>,
    routers: BTreeMap<String, Router>,
    interfaces: BTreeMap<String, RouterInterface>,
    dynamic: BTreeMap<(String, String), VlanId>,
    /// Port queries touching any of these hosts fail.
    unreachable_hosts: HashSet<String>,
}

/// In-memory orchestrator.
#[derive(Default)]
pub struct FakeOrchestrator {
    state: Mutex<OrchestratorState>,
}

impl FakeOrchestrator {
    pub fn add_subnet(&self, id: &str, network_id: &str, cidr: &str, gateway: Option<&str>) {
        self.state.lock().unwrap().subnets.insert(
            id.to_string(),
            Subnet {
                id: id.to_string(),
                network_id: network_id.to_string(),
                cidr: cidr.to_string(),
                gateway_ip: gateway.map(|g| g.parse().unwrap()),
            },
        );
    }

    pub fn set_segment(
        &self,
        network_id: &str,
        segment_type: SegmentType,
        physical_network: Option<&str>,
    ) {
        self.state.lock().unwrap().segments.insert(
            network_id.to_string(),
            NetworkSegment {
                network_id: network_id.to_string(),
                segment_type,
                physical_network: physical_network.map(str::to_string),
                segmentation_id: None,
            },
        );
    }

    pub fn add_port(&self, port: &Port, subnet_id: &str) {
        self.state
            .lock()
            .unwrap()
            .ports
            .push((port.clone(), subnet_id.to_string()));
    }

    pub fn remove_port(&self, port_id: &str) {
        self.state.lock().unwrap().ports.retain(|(p, _)| p.id != port_id);
    }

    pub fn add_router(&self, router: &Router) {
        self.state
            .lock()
            .unwrap()
            .routers
            .insert(router.id.clone(), router.clone());
    }

    pub fn add_interface(&self, iface: &RouterInterface) {
        self.state
            .lock()
            .unwrap()
            .interfaces
            .insert(iface.subnet_id.clone(), iface.clone());
    }

    pub fn remove_interface(&self, subnet_id: &str) {
        self.state.lock().unwrap().interfaces.remove(subnet_id);
    }

    pub fn fail_port_queries_for(&self, host: &str) {
        self.state
            .lock()
            .unwrap()
            .unreachable_hosts
            .insert(host.to_string());
    }

    pub fn set_dynamic_vlan(&self, network_id: &str, physnet: &str, vlan: u32) {
        self.state.lock().unwrap().dynamic.insert(
            (network_id.to_string(), physnet.to_string()),
            VlanId::new(vlan).unwrap(),
        );
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn list_ports(&self, filter: &PortFilter) -> OrchestratorResult<Vec<Port>> {
        let state = self.state.lock().unwrap();
        if filter
            .host_ids
            .iter()
            .any(|h| state.unreachable_hosts.contains(h))
        {
            return Err(OrchestratorError::Unavailable {
                message: "port query timed out".to_string(),
            });
        }
        Ok(state
            .ports
            .iter()
            .filter(|(p, subnet)| *subnet == filter.subnet_id && filter.host_ids.contains(&p.host_id))
            .map(|(p, _)| p.clone())
            .collect())
    }

    async fn subnet(&self, subnet_id: &str) -> OrchestratorResult<Option<Subnet>> {
        Ok(self.state.lock().unwrap().subnets.get(subnet_id).cloned())
    }

    async fn subnets_for_network(&self, network_id: &str) -> OrchestratorResult<Vec<Subnet>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subnets
            .values()
            .filter(|s| s.network_id == network_id)
            .cloned()
            .collect())
    }

    async fn network_segment(
        &self,
        network_id: &str,
    ) -> OrchestratorResult<Option<NetworkSegment>> {
        Ok(self.state.lock().unwrap().segments.get(network_id).cloned())
    }

    async fn router(&self, router_id: &str) -> OrchestratorResult<Option<Router>> {
        Ok(self.state.lock().unwrap().routers.get(router_id).cloned())
    }

    async fn router_ids(&self) -> OrchestratorResult<Vec<String>> {
        Ok(self.state.lock().unwrap().routers.keys().cloned().collect())
    }

    async fn network_ids(&self) -> OrchestratorResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<String> = state.subnets.values().map(|s| s.network_id.clone()).collect();
        ids.extend(state.segments.keys().cloned());
        Ok(ids)
    }

    async fn router_interface_for_subnet(
        &self,
        subnet_id: &str,
    ) -> OrchestratorResult<Option<RouterInterface>> {
        Ok(self.state.lock().unwrap().interfaces.get(subnet_id).cloned())
    }

    async fn allocate_dynamic_segment(
        &self,
        network_id: &str,
        physical_network: &str,
    ) -> OrchestratorResult<Option<DynamicSegment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .dynamic
            .get(&(network_id.to_string(), physical_network.to_string()))
            .map(|vlan| DynamicSegment {
                network_id: network_id.to_string(),
                physical_network: physical_network.to_string(),
                vlan: *vlan,
            }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    PushL2,
    RetractL2,
    PushVrf,
    RetractVrf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    L2(Op, L2Request),
    Vrf(Op, VrfRequest),
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::L2(op, _) | Call::Vrf(op, _) => *op,
        }
    }

    pub fn switch_ip(&self) -> &str {
        match self {
            Call::L2(_, r) => &r.switch_ip,
            Call::Vrf(_, r) => &r.switch_ip,
        }
    }
}

/// Records every call, failing the ones marked with [`fail_on`].
///
/// [`fail_on`]: RecordingFabric::fail_on
#[derive(Default)]
pub struct RecordingFabric {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashSet<(String, Op)>>,
}

impl RecordingFabric {
    pub fn fail_on(&self, switch_ip: &str, op: Op) {
        self.failures
            .lock()
            .unwrap()
            .insert((switch_ip.to_string(), op));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().iter().map(Call::op).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| c.op() == op).count()
    }

    pub fn l2_calls(&self, op: Op) -> Vec<L2Request> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::L2(o, r) if o == op => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn vrf_calls(&self, op: Op) -> Vec<VrfRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Vrf(o, r) if o == op => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) -> FabricResult<()> {
        let failing = self
            .failures
            .lock()
            .unwrap()
            .contains(&(call.switch_ip().to_string(), call.op()));
        self.calls.lock().unwrap().push(call);
        if failing {
            return Err(FabricError::connection_failed("http://fabric.test", 4, "injected"));
        }
        Ok(())
    }
}

#[async_trait]
impl FabricApi for RecordingFabric {
    async fn push_l2(&self, request: &L2Request) -> FabricResult<()> {
        self.record(Call::L2(Op::PushL2, request.clone()))
    }

    async fn retract_l2(&self, request: &L2Request) -> FabricResult<()> {
        self.record(Call::L2(Op::RetractL2, request.clone()))
    }

    async fn push_vrf(&self, request: &VrfRequest) -> FabricResult<()> {
        self.record(Call::Vrf(Op::PushVrf, request.clone()))
    }

    async fn retract_vrf(&self, request: &VrfRequest) -> FabricResult<()> {
        self.record(Call::Vrf(Op::RetractVrf, request.clone()))
    }
}

/// A started synchronizer over a temporary database.
pub struct Harness {
    pub sync: FabricSync,
    pub orchestrator: Arc<FakeOrchestrator>,
    pub fabric: Arc<RecordingFabric>,
    _dir: TempDir,
}

pub async fn harness() -> Harness {
    harness_with(CONFIG, FakeOrchestrator::default()).await
}

pub async fn harness_with(config: &str, orchestrator: FakeOrchestrator) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = FabricSyncConfig::from_toml_str(config).unwrap();
    config.database = DatabaseConfig::with_path(dir.path().join("fabricsync.db"));

    let orchestrator = Arc::new(orchestrator);
    let fabric = Arc::new(RecordingFabric::default());
    let sync = FabricSync::start(&config, orchestrator.clone(), fabric.clone())
        .await
        .unwrap();

    Harness {
        sync,
        orchestrator,
        fabric,
        _dir: dir,
    }
}

pub fn port(id: &str, network_id: &str, host: &str, device_owner: &str) -> Port {
    Port {
        id: id.to_string(),
        network_id: network_id.to_string(),
        project_id: "tenant".to_string(),
        device_owner: device_owner.to_string(),
        host_id: host.to_string(),
        status: PortStatus::Active,
    }
}

pub fn segments(overlay: u32, vlan: u32, physnet: &str) -> PortSegments {
    PortSegments {
        overlay: SegmentId::new(overlay).unwrap(),
        vlan: VlanId::new(vlan).unwrap(),
        physical_network: physnet.to_string(),
    }
}

/// A bound compute port event.
pub fn bound(port: &Port, segments: &PortSegments) -> PortEvent {
    PortEvent::new(port.clone(), Some(segments.clone()))
}
