//! Router lifecycle to VRF configuration.
//!
//! A router owns one L3 segment for its lifetime. Its external gateway is
//! terminated on every border leaf cabled to the gateway's physical
//! network: each such switch gets a VLAN from its own pool, an L2 push
//! towards the external network and a default route in the router's VRF.
//! Tenant subnets attach to the VRF on the leaves already carrying them.

use std::sync::Arc;

use fabric_client::{FabricApi, L2Request, VrfMode, VrfRequest};
use fabric_store::{BindingStore, BorderVlanAllocator, PortBinding, SegmentAllocator};
use fabric_types::{GatewayCidr, SegmentId, SegmentType, VlanId};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{
    ExternalGateway, Orchestrator, OrchestratorError, Router, RouterInterface,
};
use crate::reconciler::{interface_request, router_on_switch_elsewhere, PortConfigLock};
use crate::topology::Topology;

/// Addressing resolved for an external gateway.
struct GatewayPlan {
    physnet: String,
    /// Router address on the external subnet, pushed with the L2 config.
    border_ip: Option<GatewayCidr>,
    /// Upstream gateway, pushed as the default route.
    default_route: Option<GatewayCidr>,
}

/// Segments a router's gateway is programmed with.
#[derive(Debug, Clone, Copy)]
struct GatewaySegments {
    l2: SegmentId,
    l3: SegmentId,
}

/// One border leaf terminating a gateway.
struct BorderLeg<'a> {
    switch_ip: &'a str,
    interfaces: Vec<String>,
    vlan_id: VlanId,
}

fn gateway_requests(
    router: &Router,
    gateway: &ExternalGateway,
    plan: &GatewayPlan,
    segments: GatewaySegments,
    leg: &BorderLeg<'_>,
) -> (L2Request, VrfRequest) {
    let l2_request = L2Request {
        switch_ip: leg.switch_ip.to_string(),
        project_id: router.project_id.clone(),
        network_id: gateway.network_id.clone(),
        router_id: Some(router.id.clone()),
        vni: segments.l2,
        vlan_id: leg.vlan_id,
        interfaces: leg.interfaces.clone(),
        gw_ip: plan.border_ip,
    };
    let vrf_request = VrfRequest {
        switch_ip: leg.switch_ip.to_string(),
        mode: VrfMode::CreateVrf,
        project_id: router.project_id.clone(),
        network_id: gateway.network_id.clone(),
        router_id: router.id.clone(),
        router_vni: segments.l3,
        l2_vni: None,
        vlan_id: leg.vlan_id,
        gw_ip: plan.default_route,
        if_ext_gw: true,
    };
    (l2_request, vrf_request)
}

/// Router and router interface handling.
pub struct RouterGatewayCoordinator {
    orchestrator: Arc<dyn Orchestrator>,
    fabric: Arc<dyn FabricApi>,
    l2: SegmentAllocator,
    l3: SegmentAllocator,
    border: BorderVlanAllocator,
    bindings: BindingStore,
    topology: Arc<Topology>,
    lock: PortConfigLock,
}

impl RouterGatewayCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        fabric: Arc<dyn FabricApi>,
        l2: SegmentAllocator,
        l3: SegmentAllocator,
        border: BorderVlanAllocator,
        bindings: BindingStore,
        topology: Arc<Topology>,
        lock: PortConfigLock,
    ) -> Self {
        Self {
            orchestrator,
            fabric,
            l2,
            l3,
            border,
            bindings,
            topology,
            lock,
        }
    }

    /// Allocates the router's L3 segment and programs its gateway, if any.
    ///
    /// On failure nothing stays allocated for the router.
    #[instrument(skip(self, router), fields(router_id = %router.id))]
    pub async fn create_router(&self, router: &Router) -> SyncResult<SegmentId> {
        let l3 = self.l3.allocate(&router.id).await?;
        info!("Allocated L3 segment {} for router {}", l3, router.id);

        if let Some(gateway) = &router.external_gateway {
            if let Err(e) = self.add_default_gateway(router, gateway).await {
                if let Err(release) = self.l3.release(&router.id).await {
                    error!("Failed to release L3 segment of router {}: {}", router.id, release);
                }
                return Err(e);
            }
        }
        Ok(l3)
    }

    /// Follows external gateway changes.
    #[instrument(skip(self, original, updated), fields(router_id = %updated.id))]
    pub async fn update_router(&self, original: &Router, updated: &Router) -> SyncResult<()> {
        match (&original.external_gateway, &updated.external_gateway) {
            (None, Some(new)) => self.add_default_gateway(updated, new).await,
            (Some(old), None) => self.remove_default_gateway(original, old).await,
            (Some(old), Some(new)) if old.network_id != new.network_id => {
                self.remove_default_gateway(original, old).await?;
                self.add_default_gateway(updated, new).await
            }
            _ => Ok(()),
        }
    }

    /// Removes the gateway, then frees the router's L3 segment.
    #[instrument(skip(self, router), fields(router_id = %router.id))]
    pub async fn delete_router(&self, router: &Router) -> SyncResult<()> {
        if let Some(gateway) = &router.external_gateway {
            self.remove_default_gateway(router, gateway).await?;
        }
        if let Some(l3) = self.l3.release(&router.id).await? {
            info!("Released L3 segment {} of router {}", l3, router.id);
        }
        Ok(())
    }

    async fn plan_gateway(&self, gateway: &ExternalGateway) -> SyncResult<Option<GatewayPlan>> {
        let Some(segment) = self
            .orchestrator
            .network_segment(&gateway.network_id)
            .await?
        else {
            return Ok(None);
        };
        if segment.segment_type != SegmentType::ExternalNet {
            debug!(
                "External network {} is {}, no border config",
                gateway.network_id, segment.segment_type
            );
            return Ok(None);
        }
        let Some(physnet) = segment.physical_network else {
            warn!("External network {} has no physical network", gateway.network_id);
            return Ok(None);
        };

        let subnet = self
            .orchestrator
            .subnet(&gateway.subnet_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("subnet", &gateway.subnet_id))?;
        if subnet.is_ipv6() || gateway.fixed_ip.is_ipv6() {
            debug!("Skipping IPv6 gateway on subnet {}", subnet.id);
            return Ok(None);
        }

        Ok(Some(GatewayPlan {
            physnet,
            border_ip: subnet.address_cidr(gateway.fixed_ip),
            default_route: subnet.gateway_cidr(),
        }))
    }

    /// Terminates the router's gateway on every border leaf of its
    /// physical network.
    ///
    /// A failure on any switch rolls back the switches already done and
    /// every allocation made for the gateway.
    #[instrument(skip(self, router, gateway), fields(router_id = %router.id))]
    pub async fn add_default_gateway(
        &self,
        router: &Router,
        gateway: &ExternalGateway,
    ) -> SyncResult<()> {
        let Some(plan) = self.plan_gateway(gateway).await? else {
            return Ok(());
        };
        let borders = self.topology.border_switches_for_physnet(&plan.physnet);
        if borders.is_empty() {
            warn!("No border switch carries physnet {}", plan.physnet);
            return Ok(());
        }

        let segments = GatewaySegments {
            l3: self.l3.allocate(&router.id).await?,
            l2: self.l2.allocate(&router.id).await?,
        };

        for (switch_ip, interfaces) in borders {
            if let Err(e) = self
                .add_border_gateway(router, gateway, &plan, segments, switch_ip, interfaces)
                .await
            {
                error!(
                    "Gateway of router {} failed on {}: {}, rolling back",
                    router.id, switch_ip, e
                );
                self.teardown_gateway(router, gateway, Some(&plan)).await?;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn add_border_gateway(
        &self,
        router: &Router,
        gateway: &ExternalGateway,
        plan: &GatewayPlan,
        segments: GatewaySegments,
        switch_ip: &str,
        interfaces: &[String],
    ) -> SyncResult<()> {
        let leg = BorderLeg {
            switch_ip,
            interfaces: interfaces.to_vec(),
            vlan_id: self.border.allocate(switch_ip, &router.id).await?,
        };
        let (l2_request, vrf_request) = gateway_requests(router, gateway, plan, segments, &leg);

        self.fabric.push_l2(&l2_request).await?;
        self.fabric.push_vrf(&vrf_request).await?;
        info!(
            switch_ip = %switch_ip,
            "Router {} gateway on VLAN {} (segment {}, L3 {})",
            router.id,
            leg.vlan_id,
            segments.l2,
            segments.l3
        );
        Ok(())
    }

    /// Retracts the router's gateway from every border leaf holding a VLAN
    /// for it and releases the VLANs and the gateway L2 segment.
    #[instrument(skip(self, router, gateway), fields(router_id = %router.id))]
    pub async fn remove_default_gateway(
        &self,
        router: &Router,
        gateway: &ExternalGateway,
    ) -> SyncResult<()> {
        let plan = match self.plan_gateway(gateway).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Cannot resolve gateway of router {}: {}", router.id, e);
                None
            }
        };
        self.teardown_gateway(router, gateway, plan.as_ref()).await
    }

    /// Every border switch is attempted. Fabric failures are logged;
    /// the first store failure is returned after the last switch.
    async fn teardown_gateway(
        &self,
        router: &Router,
        gateway: &ExternalGateway,
        plan: Option<&GatewayPlan>,
    ) -> SyncResult<()> {
        let l2 = self.l2.find_by_owner(&router.id).await?;
        let l3 = self.l3.find_by_owner(&router.id).await?;
        let mut first_error = None;

        for (switch_ip, vlan_id) in self.border.switches_owned_by(&router.id).await? {
            if let (Some(plan), Some(l2), Some(l3)) = (plan, l2, l3) {
                let leg = BorderLeg {
                    switch_ip: &switch_ip,
                    interfaces: self.topology.border_interfaces(&switch_ip, &plan.physnet),
                    vlan_id,
                };
                let (l2_request, vrf_request) =
                    gateway_requests(router, gateway, plan, GatewaySegments { l2, l3 }, &leg);
                let vrf_request = vrf_request.with_mode(VrfMode::DeleteVrf);
                if let Err(e) = self.fabric.retract_vrf(&vrf_request).await {
                    warn!(switch_ip = %switch_ip, "Failed to retract default route of router {}: {}", router.id, e);
                }
                if let Err(e) = self.fabric.retract_l2(&l2_request).await {
                    warn!(switch_ip = %switch_ip, "Failed to retract gateway VLAN {}: {}", vlan_id, e);
                }
            } else {
                warn!(
                    switch_ip = %switch_ip,
                    "Gateway of router {} is not resolvable, releasing VLAN {} without retract",
                    router.id,
                    vlan_id
                );
            }
            match self.border.release(&switch_ip, &router.id).await {
                Ok(_) => info!(
                    switch_ip = %switch_ip,
                    "Released gateway VLAN {} of router {}",
                    vlan_id,
                    router.id
                ),
                Err(e) => {
                    error!(switch_ip = %switch_ip, "Failed to release gateway VLAN {}: {}", vlan_id, e);
                    first_error.get_or_insert(SyncError::from(e));
                }
            }
        }

        if let Some(l2) = self.l2.release(&router.id).await? {
            debug!("Released gateway segment {} of router {}", l2, router.id);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Attaches a tenant subnet to the router's VRF on every switch that
    /// carries the subnet.
    ///
    /// A failing switch rolls back the switches already attached.
    #[instrument(skip(self, iface), fields(router_id = %iface.router_id, subnet_id = %iface.subnet_id))]
    pub async fn add_router_interface(&self, iface: &RouterInterface) -> SyncResult<()> {
        let _guard = self.lock.lock().await;

        let bindings = self.bindings.find_by_switch(&iface.subnet_id).await?;
        if bindings.is_empty() {
            debug!("Subnet {} is on no switch yet", iface.subnet_id);
            return Ok(());
        }
        let l3 = self.l3.allocate(&iface.router_id).await?;
        let gw_ip = self
            .orchestrator
            .subnet(&iface.subnet_id)
            .await?
            .and_then(|s| s.gateway_cidr());

        let mut attached: Vec<VrfRequest> = Vec::new();
        for binding in bindings {
            if binding.is_attached_to(&iface.router_id) {
                continue;
            }
            let vrf_exists = router_on_switch_elsewhere(
                &self.bindings,
                &binding.switch_ip,
                &iface.router_id,
                &binding.subnet_id,
            )
            .await?;
            let request =
                interface_request(&binding, iface, l3, gw_ip, VrfMode::for_push(vrf_exists));

            if let Err(e) = self.fabric.push_vrf(&request).await {
                self.rollback_attach(&iface.subnet_id, &attached).await?;
                return Err(e.into());
            }
            self.bindings
                .attach_router(&binding.switch_ip, &binding.subnet_id, &iface.router_id, l3)
                .await?;
            info!(
                switch_ip = %binding.switch_ip,
                "Attached subnet {} to router {} ({:?})",
                iface.subnet_id,
                iface.router_id,
                request.mode
            );
            attached.push(request);
        }
        Ok(())
    }

    async fn rollback_attach(&self, subnet_id: &str, attached: &[VrfRequest]) -> SyncResult<()> {
        for request in attached.iter().rev() {
            let mode = match request.mode {
                VrfMode::CreateVrf => VrfMode::DeleteVrf,
                _ => VrfMode::DetachInterface,
            };
            if let Err(e) = self.fabric.retract_vrf(&request.with_mode(mode)).await {
                warn!(switch_ip = %request.switch_ip, "Rollback of router {} failed: {}", request.router_id, e);
            }
            self.bindings
                .detach_router(&request.switch_ip, subnet_id)
                .await?;
        }
        Ok(())
    }

    /// Detaches a tenant subnet from the router's VRF on every switch that
    /// carries it. Fabric failures are logged and do not stop the
    /// remaining switches.
    #[instrument(skip(self, iface), fields(router_id = %iface.router_id, subnet_id = %iface.subnet_id))]
    pub async fn remove_router_interface(&self, iface: &RouterInterface) -> SyncResult<()> {
        let _guard = self.lock.lock().await;

        let gw_ip = match self.orchestrator.subnet(&iface.subnet_id).await {
            Ok(subnet) => subnet.and_then(|s| s.gateway_cidr()),
            Err(e) => {
                warn!("Cannot resolve subnet {}: {}", iface.subnet_id, e);
                None
            }
        };

        let mut first_error = None;
        for binding in self.bindings.find_by_switch(&iface.subnet_id).await? {
            if let Err(e) = self.detach_binding(&binding, iface, gw_ip).await {
                warn!(
                    switch_ip = %binding.switch_ip,
                    "Failed to detach subnet {} from router {}: {}",
                    iface.subnet_id,
                    iface.router_id,
                    e
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn detach_binding(
        &self,
        binding: &PortBinding,
        iface: &RouterInterface,
        gw_ip: Option<GatewayCidr>,
    ) -> SyncResult<()> {
        if !binding.is_attached_to(&iface.router_id) {
            return Ok(());
        }
        let Some(l3) = binding.l3_segment_id else {
            return Ok(());
        };
        let last = !router_on_switch_elsewhere(
            &self.bindings,
            &binding.switch_ip,
            &iface.router_id,
            &binding.subnet_id,
        )
        .await?;
        let request = interface_request(binding, iface, l3, gw_ip, VrfMode::for_retract(last));
        if let Err(e) = self.fabric.retract_vrf(&request).await {
            warn!(
                switch_ip = %binding.switch_ip,
                "Failed to retract router {} for subnet {}: {}",
                iface.router_id,
                iface.subnet_id,
                e
            );
        }
        self.bindings
            .detach_router(&binding.switch_ip, &binding.subnet_id)
            .await?;
        info!(
            switch_ip = %binding.switch_ip,
            "Detached subnet {} from router {} ({:?})",
            iface.subnet_id,
            iface.router_id,
            request.mode
        );
        Ok(())
    }
}