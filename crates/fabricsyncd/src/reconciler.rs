//! Port lifecycle to switch configuration.
//!
//! Each leaf switch carries a subnet at most once: the first bound port of
//! the subnet on any host cabled to the switch creates the binding row and
//! pushes L2 config, the last one to leave retracts it. When the subnet is
//! routed, the VRF interface follows the binding.
//!
//! Every decision runs under the port configuration lock, since the "last
//! port on this switch" check reads orchestrator state that nothing else
//! serializes.

use std::sync::Arc;

use fabric_client::{FabricApi, L2Request, VrfMode, VrfRequest};
use fabric_store::{BindingStore, PortBinding, SegmentAllocator, StoreError, StoreResult};
use fabric_types::{GatewayCidr, SegmentId, SegmentType, VlanId};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{
    DynamicSegment, NetworkSegment, Orchestrator, Port, PortEvent, PortFilter, PortSegments,
    RouterInterface, Subnet,
};
use crate::topology::{LeafSwitch, Topology};

/// The process-wide port configuration critical section.
pub type PortConfigLock = Arc<Mutex<()>>;

/// Creates a port configuration lock to share between the reconciler and
/// the router coordinator.
pub fn port_config_lock() -> PortConfigLock {
    Arc::new(Mutex::new(()))
}

/// True if a binding on `switch_ip` for another subnet already carries
/// the router, i.e. the switch has its VRF.
pub(crate) async fn router_on_switch_elsewhere(
    bindings: &BindingStore,
    switch_ip: &str,
    router_id: &str,
    subnet_id: &str,
) -> StoreResult<bool> {
    Ok(bindings
        .router_bindings_on_switch(switch_ip, router_id)
        .await?
        .iter()
        .any(|b| b.subnet_id != subnet_id))
}

/// VRF interface request for a tenant subnet binding.
pub(crate) fn interface_request(
    binding: &PortBinding,
    iface: &RouterInterface,
    l3_segment_id: SegmentId,
    gw_ip: Option<GatewayCidr>,
    mode: VrfMode,
) -> VrfRequest {
    VrfRequest {
        switch_ip: binding.switch_ip.clone(),
        mode,
        project_id: iface.project_id.clone(),
        network_id: iface.network_id.clone(),
        router_id: iface.router_id.clone(),
        router_vni: l3_segment_id,
        l2_vni: Some(binding.l2_segment_id),
        vlan_id: binding.vlan_id,
        gw_ip,
        if_ext_gw: false,
    }
}

fn l2_request(
    leaf: &LeafSwitch,
    project_id: &str,
    subnet: &Subnet,
    vlan_id: VlanId,
    vni: SegmentId,
) -> L2Request {
    L2Request {
        switch_ip: leaf.ip.clone(),
        project_id: project_id.to_string(),
        network_id: subnet.network_id.clone(),
        router_id: None,
        vni,
        vlan_id,
        interfaces: leaf.interfaces(),
        gw_ip: subnet.gateway_cidr(),
    }
}

fn vanished(switch_ip: &str, subnet_id: &str) -> SyncError {
    StoreError::corrupt(
        "port_bindings",
        format!("binding {} / {} vanished after upsert", switch_ip, subnet_id),
    )
    .into()
}

/// Applies port lifecycle events to the leaf switches.
pub struct SwitchConfigReconciler {
    orchestrator: Arc<dyn Orchestrator>,
    fabric: Arc<dyn FabricApi>,
    bindings: BindingStore,
    l3: SegmentAllocator,
    topology: Arc<Topology>,
    lock: PortConfigLock,
}

impl SwitchConfigReconciler {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        fabric: Arc<dyn FabricApi>,
        bindings: BindingStore,
        l3: SegmentAllocator,
        topology: Arc<Topology>,
        lock: PortConfigLock,
    ) -> Self {
        Self {
            orchestrator,
            fabric,
            bindings,
            l3,
            topology,
            lock,
        }
    }

    /// Handles a port update.
    ///
    /// A port that lost its binding while moving to another host, or that
    /// went down, is removed from the switches of its previous state. Any
    /// other port of a supported owner is configured.
    #[instrument(skip(self, event), fields(port_id = %event.port.id))]
    pub async fn update_port(&self, event: &PortEvent) -> SyncResult<()> {
        let _guard = self.lock.lock().await;

        if Self::is_migrating(event) || event.port.status.is_down() {
            let port = event.original.as_ref().unwrap_or(&event.port);
            let segments = event
                .original_segments
                .as_ref()
                .or(event.segments.as_ref());
            debug!(
                "Port {} is {}, removing switch config",
                port.id,
                if event.port.status.is_down() { "down" } else { "migrating" }
            );
            return match segments {
                Some(segments) => self.unconfigure(port, segments).await,
                None => Ok(()),
            };
        }

        if !event.port.owner_class().is_supported() {
            debug!("Ignoring port {} owned by {}", event.port.id, event.port.device_owner);
            return Ok(());
        }
        match &event.segments {
            Some(segments) => self.configure(&event.port, segments).await,
            None => Ok(()),
        }
    }

    /// Handles a port deletion.
    #[instrument(skip(self, event), fields(port_id = %event.port.id))]
    pub async fn delete_port(&self, event: &PortEvent) -> SyncResult<()> {
        let _guard = self.lock.lock().await;

        if !event.port.owner_class().is_supported() {
            return Ok(());
        }
        match &event.segments {
            Some(segments) => self.unconfigure(&event.port, segments).await,
            None => Ok(()),
        }
    }

    /// Configures the switches serving a bound port.
    pub async fn port_bound(&self, port: &Port, segments: &PortSegments) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        self.configure(port, segments).await
    }

    /// Removes switch config a port no longer needs.
    pub async fn port_unbound(&self, port: &Port, segments: &PortSegments) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        self.unconfigure(port, segments).await
    }

    /// Rejects a second subnet on a network.
    pub async fn validate_subnet_create(&self, subnet: &Subnet) -> SyncResult<()> {
        let existing = self
            .orchestrator
            .subnets_for_network(&subnet.network_id)
            .await?;
        if existing.iter().any(|s| s.id != subnet.id) {
            return Err(SyncError::SubnetLimit {
                network_id: subnet.network_id.clone(),
            });
        }
        Ok(())
    }

    /// Picks the dynamic VLAN segment for a port on a tenant overlay
    /// network. Returns None if no segment is of the overlay type.
    #[instrument(skip(self, port, segments), fields(port_id = %port.id, host_id = %port.host_id))]
    pub async fn bind_port(
        &self,
        port: &Port,
        segments: &[NetworkSegment],
    ) -> SyncResult<Option<DynamicSegment>> {
        if !segments
            .iter()
            .any(|s| s.segment_type == SegmentType::TenantOverlay)
        {
            return Ok(None);
        }

        let physnet = self
            .topology
            .physnet_for_host(&port.host_id)
            .ok_or_else(|| SyncError::PhysnetNotConfigured {
                host_id: port.host_id.clone(),
                switches: self
                    .topology
                    .switches_for_host(&port.host_id)
                    .iter()
                    .map(|l| l.ip.clone())
                    .collect(),
            })?;

        let dynamic = self
            .orchestrator
            .allocate_dynamic_segment(&port.network_id, physnet)
            .await?
            .ok_or_else(|| SyncError::NoDynamicSegmentAllocated {
                network_id: port.network_id.clone(),
                physnet: physnet.to_string(),
            })?;

        info!(
            "Bound port {} to VLAN {} on physnet {}",
            port.id, dynamic.vlan, physnet
        );
        Ok(Some(dynamic))
    }

    fn is_migrating(event: &PortEvent) -> bool {
        match (&event.original, &event.segments, &event.original_segments) {
            (Some(original), None, Some(_)) => original.host_id != event.port.host_id,
            _ => false,
        }
    }

    async fn subnet_of(&self, port: &Port) -> SyncResult<Option<Subnet>> {
        Ok(self
            .orchestrator
            .subnets_for_network(&port.network_id)
            .await?
            .into_iter()
            .next())
    }

    fn matching_switches(&self, port: &Port, segments: &PortSegments) -> Vec<&LeafSwitch> {
        self.topology
            .switches_for_host(&port.host_id)
            .into_iter()
            .filter(|l| l.serves_physnet(&segments.physical_network))
            .collect()
    }

    async fn configure(&self, port: &Port, segments: &PortSegments) -> SyncResult<()> {
        if port.host_id.is_empty() {
            return Ok(());
        }
        let Some(subnet) = self.subnet_of(port).await? else {
            debug!("Network {} has no subnet yet", port.network_id);
            return Ok(());
        };

        let switches = self.matching_switches(port, segments);
        if switches.is_empty() {
            debug!(
                "No switch on physnet {} serves host {}",
                segments.physical_network, port.host_id
            );
            return Ok(());
        }

        let router_iface = self
            .orchestrator
            .router_interface_for_subnet(&subnet.id)
            .await?;

        for leaf in switches {
            self.configure_switch(leaf, port, segments, &subnet, router_iface.as_ref())
                .await?;
        }
        Ok(())
    }

    async fn configure_switch(
        &self,
        leaf: &LeafSwitch,
        port: &Port,
        segments: &PortSegments,
        subnet: &Subnet,
        router_iface: Option<&RouterInterface>,
    ) -> SyncResult<()> {
        let created = self
            .bindings
            .upsert_l2(&leaf.ip, &subnet.id, segments.vlan, segments.overlay)
            .await?;
        let binding = self
            .bindings
            .get(&leaf.ip, &subnet.id)
            .await?
            .ok_or_else(|| vanished(&leaf.ip, &subnet.id))?;

        let mut pushed = None;
        if !binding.is_l2_configured {
            let request = l2_request(
                leaf,
                &port.project_id,
                subnet,
                binding.vlan_id,
                binding.l2_segment_id,
            );
            if let Err(e) = self.fabric.push_l2(&request).await {
                if created {
                    self.bindings.remove_if_unused(&leaf.ip, &subnet.id).await?;
                }
                return Err(e.into());
            }
            self.bindings
                .mark_l2_configured(&leaf.ip, &subnet.id)
                .await?;
            info!(
                switch_ip = %leaf.ip,
                subnet_id = %subnet.id,
                "Configured VLAN {} for segment {}",
                binding.vlan_id,
                binding.l2_segment_id
            );
            pushed = Some(request);
        }

        let Some(iface) = router_iface else {
            return Ok(());
        };
        if binding.is_attached_to(&iface.router_id) {
            return Ok(());
        }
        if let Err(e) = self.attach_interface(&binding, iface, subnet).await {
            if let (true, Some(request)) = (created, pushed) {
                if let Err(retract) = self.fabric.retract_l2(&request).await {
                    warn!("Failed to roll back L2 config on {}: {}", leaf.ip, retract);
                }
                self.bindings.remove_if_unused(&leaf.ip, &subnet.id).await?;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn attach_interface(
        &self,
        binding: &PortBinding,
        iface: &RouterInterface,
        subnet: &Subnet,
    ) -> SyncResult<()> {
        let l3 = self.l3.allocate(&iface.router_id).await?;
        let vrf_exists = router_on_switch_elsewhere(
            &self.bindings,
            &binding.switch_ip,
            &iface.router_id,
            &binding.subnet_id,
        )
        .await?;
        let request = interface_request(
            binding,
            iface,
            l3,
            subnet.gateway_cidr(),
            VrfMode::for_push(vrf_exists),
        );
        self.fabric.push_vrf(&request).await?;
        self.bindings
            .attach_router(&binding.switch_ip, &binding.subnet_id, &iface.router_id, l3)
            .await?;
        info!(
            switch_ip = %binding.switch_ip,
            subnet_id = %binding.subnet_id,
            "Attached router {} ({:?})",
            iface.router_id,
            request.mode
        );
        Ok(())
    }

    async fn unconfigure(&self, port: &Port, segments: &PortSegments) -> SyncResult<()> {
        if port.host_id.is_empty() {
            return Ok(());
        }
        let Some(subnet) = self.subnet_of(port).await? else {
            return Ok(());
        };

        // Every switch gets its turn; the first failure is reported at the end.
        let mut first_error = None;
        for leaf in self.matching_switches(port, segments) {
            if let Err(e) = self.unconfigure_switch(leaf, port, &subnet).await {
                warn!(
                    switch_ip = %leaf.ip,
                    subnet_id = %subnet.id,
                    "Failed to clean up switch: {}",
                    e
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Ports other than `port` and DHCP ports still holding the subnet on
    /// the switch.
    async fn remaining_ports(
        &self,
        leaf: &LeafSwitch,
        port: &Port,
        subnet_id: &str,
    ) -> SyncResult<usize> {
        let filter = PortFilter {
            host_ids: leaf.hosts(),
            subnet_id: subnet_id.to_string(),
        };
        Ok(self
            .orchestrator
            .list_ports(&filter)
            .await?
            .iter()
            .filter(|p| p.id != port.id && !p.owner_class().is_dhcp())
            .count())
    }

    async fn unconfigure_switch(
        &self,
        leaf: &LeafSwitch,
        port: &Port,
        subnet: &Subnet,
    ) -> SyncResult<()> {
        let remaining = self.remaining_ports(leaf, port, &subnet.id).await?;
        if remaining > 0 {
            debug!(
                switch_ip = %leaf.ip,
                subnet_id = %subnet.id,
                "{} ports remain, keeping config",
                remaining
            );
            return Ok(());
        }

        let Some(binding) = self.bindings.get(&leaf.ip, &subnet.id).await? else {
            return Ok(());
        };

        if let (Some(router_id), Some(l3)) = (&binding.router_id, binding.l3_segment_id) {
            let last = !router_on_switch_elsewhere(
                &self.bindings,
                &leaf.ip,
                router_id,
                &subnet.id,
            )
            .await?;
            let request = VrfRequest {
                switch_ip: leaf.ip.clone(),
                mode: VrfMode::for_retract(last),
                project_id: port.project_id.clone(),
                network_id: subnet.network_id.clone(),
                router_id: router_id.clone(),
                router_vni: l3,
                l2_vni: Some(binding.l2_segment_id),
                vlan_id: binding.vlan_id,
                gw_ip: subnet.gateway_cidr(),
                if_ext_gw: false,
            };
            if let Err(e) = self.fabric.retract_vrf(&request).await {
                warn!(
                    switch_ip = %leaf.ip,
                    "Failed to retract router {} for subnet {}: {}",
                    router_id,
                    subnet.id,
                    e
                );
            }
        }

        if binding.is_l2_configured {
            let request = l2_request(
                leaf,
                &port.project_id,
                subnet,
                binding.vlan_id,
                binding.l2_segment_id,
            );
            if let Err(e) = self.fabric.retract_l2(&request).await {
                warn!(
                    switch_ip = %leaf.ip,
                    "Failed to retract VLAN {} for subnet {}: {}",
                    binding.vlan_id,
                    subnet.id,
                    e
                );
            }
        }

        self.bindings.remove_if_unused(&leaf.ip, &subnet.id).await?;
        info!(
            switch_ip = %leaf.ip,
            subnet_id = %subnet.id,
            "Removed config for VLAN {}",
            binding.vlan_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_types::PortStatus;

    fn port(host: &str) -> Port {
        Port {
            id: "p1".to_string(),
            network_id: "n1".to_string(),
            project_id: "t1".to_string(),
            device_owner: "compute:nova".to_string(),
            host_id: host.to_string(),
            status: PortStatus::Active,
        }
    }

    fn segments() -> PortSegments {
        PortSegments {
            overlay: SegmentId::new(10008).unwrap(),
            vlan: VlanId::new(105).unwrap(),
            physical_network: "provider".to_string(),
        }
    }

    #[test]
    fn test_migration_detection() {
        let moved = PortEvent::new(port("compute2"), None).with_original(port("compute1"), Some(segments()));
        assert!(SwitchConfigReconciler::is_migrating(&moved));

        let same_host = PortEvent::new(port("compute1"), None).with_original(port("compute1"), Some(segments()));
        assert!(!SwitchConfigReconciler::is_migrating(&same_host));

        let still_bound = PortEvent::new(port("compute2"), Some(segments()))
            .with_original(port("compute1"), Some(segments()));
        assert!(!SwitchConfigReconciler::is_migrating(&still_bound));

        assert!(!SwitchConfigReconciler::is_migrating(&PortEvent::new(port("compute1"), None)));
    }
}
