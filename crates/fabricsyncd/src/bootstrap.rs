//! Startup: open the store, reconcile the pools with the configuration and
//! wire the handlers together.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use fabric_client::FabricApi;
use fabric_store::{
    BindingStore, BorderVlanAllocator, Database, PoolStats, SegmentAllocator, SyncReport,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{FabricSyncConfig, PoolRanges};
use crate::error::SyncResult;
use crate::orchestrator::Orchestrator;
use crate::reconciler::{port_config_lock, SwitchConfigReconciler};
use crate::router::RouterGatewayCoordinator;
use crate::segment_driver::OverlaySegmentDriver;
use crate::topology::Topology;

/// Per-pool outcome of a sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub l2_segment: SyncReport,
    pub l3_segment: SyncReport,
    pub border_vlan: BTreeMap<String, SyncReport>,
}

/// Pool usage and binding count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub l2_segment: PoolStats,
    pub l3_segment: PoolStats,
    pub border_vlan: BTreeMap<String, PoolStats>,
    pub bindings: usize,
}

/// Owners released by [`reap_stranded`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub l2_segment: Vec<String>,
    pub l3_segment: Vec<String>,
    /// `(switch_ip, owner)` pairs.
    pub border_vlan: Vec<(String, String)>,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.l2_segment.is_empty() && self.l3_segment.is_empty() && self.border_vlan.is_empty()
    }
}

/// The allocation pools and binding table over one database.
#[derive(Debug, Clone)]
pub struct Stores {
    pub db: Database,
    pub l2: SegmentAllocator,
    pub l3: SegmentAllocator,
    pub border: BorderVlanAllocator,
    pub bindings: BindingStore,
}

impl Stores {
    /// Validates the configuration and connects to its database.
    pub async fn open(config: &FabricSyncConfig) -> SyncResult<Self> {
        let ranges = config.validate()?;
        let db = Database::connect(&config.database).await?;
        Ok(Self::with_ranges(db, ranges))
    }

    pub fn with_ranges(db: Database, ranges: PoolRanges) -> Self {
        Self {
            l2: SegmentAllocator::l2(db.clone(), ranges.l2_segment),
            l3: SegmentAllocator::l3(db.clone(), ranges.l3_segment),
            border: BorderVlanAllocator::new(db.clone(), ranges.border_vlan),
            bindings: BindingStore::new(db.clone()),
            db,
        }
    }

    /// Reconciles every pool with its configured ranges.
    pub async fn sync_all(&self) -> SyncResult<SyncSummary> {
        let summary = SyncSummary {
            l2_segment: self.l2.sync().await?,
            l3_segment: self.l3.sync().await?,
            border_vlan: self.border.sync().await?,
        };

        let stranded = summary.l2_segment.stranded
            + summary.l3_segment.stranded
            + summary.border_vlan.values().map(|r| r.stranded).sum::<usize>();
        if stranded > 0 {
            warn!("{} owned ids lie outside the configured ranges", stranded);
        }
        Ok(summary)
    }

    pub async fn stats(&self) -> SyncResult<StatsReport> {
        let mut border_vlan = BTreeMap::new();
        for switch_ip in self.border.switches() {
            border_vlan.insert(switch_ip.to_string(), self.border.stats(switch_ip).await?);
        }
        Ok(StatsReport {
            l2_segment: self.l2.stats().await?,
            l3_segment: self.l3.stats().await?,
            border_vlan,
            bindings: self.bindings.list().await?.len(),
        })
    }
}

/// Deletes stranded allocations whose owner the orchestrator no longer
/// knows.
///
/// A stranded row is owned but lies outside the configured ranges, so a
/// sync pass had to keep it. Rows inside the ranges are left to the normal
/// release paths. L3 segments and border VLANs belong to routers; L2
/// segments belong to routers (gateway segments) or networks.
pub async fn reap_stranded(
    stores: &Stores,
    orchestrator: &dyn Orchestrator,
) -> SyncResult<ReapReport> {
    let routers: HashSet<String> = orchestrator.router_ids().await?.into_iter().collect();
    let networks: HashSet<String> = orchestrator.network_ids().await?.into_iter().collect();
    let mut report = ReapReport::default();

    for (id, owner) in stores.l3.owners().await? {
        if !stores.l3.in_range(id) && !routers.contains(&owner) {
            stores.l3.release_id(id).await?;
            info!("Reaped L3 segment {} of unknown router {}", id, owner);
            report.l3_segment.push(owner);
        }
    }

    for (id, owner) in stores.l2.owners().await? {
        if !stores.l2.in_range(id) && !routers.contains(&owner) && !networks.contains(&owner) {
            stores.l2.release_id(id).await?;
            info!("Reaped L2 segment {} of unknown owner {}", id, owner);
            report.l2_segment.push(owner);
        }
    }

    for (switch_ip, vlan, owner) in stores.border.owners().await? {
        let stranded = !stores.border.ranges(&switch_ip).contains(vlan.as_u32());
        if stranded && !routers.contains(&owner) {
            stores.border.release(&switch_ip, &owner).await?;
            info!("Reaped VLAN {} on {} of unknown router {}", vlan, switch_ip, owner);
            report.border_vlan.push((switch_ip, owner));
        }
    }

    Ok(report)
}

/// A running synchronizer: stores plus the event handlers.
pub struct FabricSync {
    pub stores: Stores,
    pub topology: Arc<Topology>,
    pub reconciler: SwitchConfigReconciler,
    pub routers: RouterGatewayCoordinator,
    pub segments: OverlaySegmentDriver,
}

impl FabricSync {
    /// Opens the store, syncs the pools, reaps stranded owners and builds
    /// the handlers.
    pub async fn start(
        config: &FabricSyncConfig,
        orchestrator: Arc<dyn Orchestrator>,
        fabric: Arc<dyn FabricApi>,
    ) -> SyncResult<Self> {
        let stores = Stores::open(config).await?;

        let summary = stores.sync_all().await?;
        info!(
            "Pools synced: l2 +{}/-{}, l3 +{}/-{}, {} border switches",
            summary.l2_segment.inserted,
            summary.l2_segment.deleted,
            summary.l3_segment.inserted,
            summary.l3_segment.deleted,
            summary.border_vlan.len()
        );

        let reaped = reap_stranded(&stores, orchestrator.as_ref()).await?;
        if !reaped.is_empty() {
            info!("Reaped stranded allocations: {:?}", reaped);
        }

        Ok(Self::assemble(config, stores, orchestrator, fabric))
    }

    /// Builds the handlers over already opened stores.
    pub fn assemble(
        config: &FabricSyncConfig,
        stores: Stores,
        orchestrator: Arc<dyn Orchestrator>,
        fabric: Arc<dyn FabricApi>,
    ) -> Self {
        let topology = Arc::new(Topology::from_config(config));
        let lock = port_config_lock();

        let reconciler = SwitchConfigReconciler::new(
            orchestrator.clone(),
            fabric.clone(),
            stores.bindings.clone(),
            stores.l3.clone(),
            topology.clone(),
            lock.clone(),
        );
        let routers = RouterGatewayCoordinator::new(
            orchestrator,
            fabric,
            stores.l2.clone(),
            stores.l3.clone(),
            stores.border.clone(),
            stores.bindings.clone(),
            topology.clone(),
            lock,
        );
        let segments = OverlaySegmentDriver::new(
            stores.l2.clone(),
            config.external_networks.allowed_physnets.clone(),
        );

        Self {
            stores,
            topology,
            reconciler,
            routers,
            segments,
        }
    }
}
