//! Per-switch VLAN pools of the border leaves.

use std::collections::BTreeMap;

use fabric_types::{RangeSet, VlanId};
use tracing::{info, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::pool::{self, PoolStats, PoolTable, SyncReport};

/// Allocator for the border-leaf VLAN pools, one independent range set per
/// switch IP. Owners are router ids.
#[derive(Debug, Clone)]
pub struct BorderVlanAllocator {
    db: Database,
    ranges: BTreeMap<String, RangeSet>,
}

impl BorderVlanAllocator {
    const TABLE: PoolTable = PoolTable::BORDER_VLAN;

    /// Creates the allocator from the per-switch ranges.
    pub fn new(db: Database, ranges: BTreeMap<String, RangeSet>) -> Self {
        Self { db, ranges }
    }

    /// Ranges configured for `switch_ip`; empty when the switch is unknown.
    pub fn ranges(&self, switch_ip: &str) -> RangeSet {
        self.ranges.get(switch_ip).cloned().unwrap_or_default()
    }

    /// Configured border switches.
    pub fn switches(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    fn vlan(raw: u32) -> StoreResult<VlanId> {
        VlanId::new(raw).map_err(|e| StoreError::corrupt(Self::TABLE.table, e.to_string()))
    }

    /// Syncs every configured switch and every switch that still has rows.
    ///
    /// A switch dropped from the configuration syncs against an empty range
    /// set: its free rows go away, its owned rows stay until released.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> StoreResult<BTreeMap<String, SyncReport>> {
        let mut switches: Vec<String> = self.ranges.keys().cloned().collect();
        for switch_ip in pool::scopes(&self.db, &Self::TABLE).await? {
            if !self.ranges.contains_key(&switch_ip) {
                info!("Border switch {} is no longer configured", switch_ip);
                switches.push(switch_ip);
            }
        }

        let mut reports = BTreeMap::new();
        for switch_ip in switches {
            let ranges = self.ranges(&switch_ip);
            let report = pool::sync(&self.db, &Self::TABLE, Some(&switch_ip), &ranges).await?;
            reports.insert(switch_ip, report);
        }
        Ok(reports)
    }

    /// Allocates a VLAN on `switch_ip` for `owner`.
    #[instrument(skip(self))]
    pub async fn allocate(&self, switch_ip: &str, owner: &str) -> StoreResult<VlanId> {
        let ranges = self.ranges(switch_ip);
        let raw = pool::allocate(&self.db, &Self::TABLE, Some(switch_ip), &ranges, owner).await?;
        Self::vlan(raw)
    }

    /// Releases the VLAN held by `owner` on `switch_ip`.
    #[instrument(skip(self))]
    pub async fn release(&self, switch_ip: &str, owner: &str) -> StoreResult<Option<VlanId>> {
        let ranges = self.ranges(switch_ip);
        let released =
            pool::release(&self.db, &Self::TABLE, Some(switch_ip), &ranges, owner).await?;
        released.into_iter().next().map(Self::vlan).transpose()
    }

    /// The VLAN held by `owner` on `switch_ip`.
    pub async fn find_by_owner(&self, switch_ip: &str, owner: &str) -> StoreResult<Option<VlanId>> {
        pool::find_by_owner(&self.db, &Self::TABLE, Some(switch_ip), owner)
            .await?
            .map(Self::vlan)
            .transpose()
    }

    /// Every switch on which `owner` holds a VLAN, ordered by switch IP.
    pub async fn switches_owned_by(&self, owner: &str) -> StoreResult<Vec<(String, VlanId)>> {
        let mut owned = Vec::new();
        for row in pool::owned_rows(&self.db, &Self::TABLE).await? {
            if row.owner != owner {
                continue;
            }
            if let Some(switch_ip) = row.scope {
                owned.push((switch_ip, Self::vlan(row.id)?));
            }
        }
        owned.sort();
        Ok(owned)
    }

    /// All owned VLANs as `(switch_ip, vlan, owner)`.
    pub async fn owners(&self) -> StoreResult<Vec<(String, VlanId, String)>> {
        let mut owned = Vec::new();
        for row in pool::owned_rows(&self.db, &Self::TABLE).await? {
            if let Some(switch_ip) = row.scope {
                owned.push((switch_ip, Self::vlan(row.id)?, row.owner));
            }
        }
        Ok(owned)
    }

    pub async fn stats(&self, switch_ip: &str) -> StoreResult<PoolStats> {
        pool::stats(&self.db, &Self::TABLE, Some(switch_ip)).await
    }
}
