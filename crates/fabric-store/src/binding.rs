//! Per-(switch, subnet) binding rows.
//!
//! A binding row records that a switch carries a subnet: the VLAN and L2
//! segment pushed for it, whether the L2 push happened, and the router the
//! subnet's VRF interface was attached to. It is the unit of idempotency
//! for configuration pushes; a UNIQUE index keeps one row per pair.

use fabric_types::{SegmentId, VlanId};
use sqlx::FromRow;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

const TABLE: &str = "port_bindings";

const SELECT_COLUMNS: &str = "SELECT binding_id, switch_ip, vlan_id, l2_segment_id, \
     is_l2_configured, subnet_id, router_id, l3_segment_id FROM port_bindings";

#[derive(Debug, FromRow)]
struct BindingRow {
    binding_id: i64,
    switch_ip: String,
    vlan_id: i64,
    l2_segment_id: i64,
    is_l2_configured: bool,
    subnet_id: String,
    router_id: String,
    l3_segment_id: i64,
}

/// One switch carrying one subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub binding_id: i64,
    pub switch_ip: String,
    pub vlan_id: VlanId,
    pub l2_segment_id: SegmentId,
    pub is_l2_configured: bool,
    pub subnet_id: String,
    /// Router whose VRF interface is attached on this switch.
    pub router_id: Option<String>,
    pub l3_segment_id: Option<SegmentId>,
}

impl PortBinding {
    /// Returns true if the binding is attached to `router_id`.
    pub fn is_attached_to(&self, router_id: &str) -> bool {
        self.router_id.as_deref() == Some(router_id)
    }
}

impl TryFrom<BindingRow> for PortBinding {
    type Error = StoreError;

    fn try_from(row: BindingRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, raw: i64| {
            StoreError::corrupt(TABLE, format!("{} {} in binding {}", what, raw, row.binding_id))
        };
        let vlan_id = u32::try_from(row.vlan_id)
            .ok()
            .and_then(|v| VlanId::new(v).ok())
            .ok_or_else(|| corrupt("vlan_id", row.vlan_id))?;
        let l2_segment_id = u32::try_from(row.l2_segment_id)
            .ok()
            .and_then(|v| SegmentId::new(v).ok())
            .ok_or_else(|| corrupt("l2_segment_id", row.l2_segment_id))?;
        let l3_segment_id = match row.l3_segment_id {
            0 => None,
            raw => Some(
                u32::try_from(raw)
                    .ok()
                    .and_then(|v| SegmentId::new(v).ok())
                    .ok_or_else(|| corrupt("l3_segment_id", raw))?,
            ),
        };

        Ok(PortBinding {
            binding_id: row.binding_id,
            switch_ip: row.switch_ip,
            vlan_id,
            l2_segment_id,
            is_l2_configured: row.is_l2_configured,
            subnet_id: row.subnet_id,
            router_id: Some(row.router_id).filter(|r| !r.is_empty()),
            l3_segment_id,
        })
    }
}

fn into_bindings(rows: Vec<BindingRow>) -> StoreResult<Vec<PortBinding>> {
    rows.into_iter().map(PortBinding::try_from).collect()
}

/// Access to the `port_bindings` table.
#[derive(Debug, Clone)]
pub struct BindingStore {
    db: Database,
}

impl BindingStore {
    /// Creates a binding store over the database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates the binding row for `(switch_ip, subnet_id)` if absent.
    ///
    /// Returns true if this call created the row, false if one existed.
    #[instrument(skip(self))]
    pub async fn upsert_l2(
        &self,
        switch_ip: &str,
        subnet_id: &str,
        vlan_id: VlanId,
        l2_segment_id: SegmentId,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO port_bindings (switch_ip, subnet_id, vlan_id, l2_segment_id) \
             VALUES (?, ?, ?, ?) ON CONFLICT (switch_ip, subnet_id) DO NOTHING",
        )
        .bind(switch_ip)
        .bind(subnet_id)
        .bind(i64::from(vlan_id.as_u32()))
        .bind(i64::from(l2_segment_id.as_u32()))
        .execute(self.db.writer())
        .await
        .map_err(|e| StoreError::database("upsert binding", e))?;

        let created = result.rows_affected() == 1;
        if created {
            debug!("Created binding {} / {}", switch_ip, subnet_id);
        }
        Ok(created)
    }

    /// Looks up the binding for `(switch_ip, subnet_id)`.
    pub async fn get(&self, switch_ip: &str, subnet_id: &str) -> StoreResult<Option<PortBinding>> {
        let sql = format!("{} WHERE switch_ip = ? AND subnet_id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, BindingRow>(&sql)
            .bind(switch_ip)
            .bind(subnet_id)
            .fetch_optional(self.db.reader())
            .await
            .map_err(|e| StoreError::database("get binding", e))?;
        row.map(PortBinding::try_from).transpose()
    }

    /// Flips `is_l2_configured` to true.
    ///
    /// Returns true only for the call that performed the flip.
    pub async fn mark_l2_configured(&self, switch_ip: &str, subnet_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE port_bindings SET is_l2_configured = 1 \
             WHERE switch_ip = ? AND subnet_id = ? AND is_l2_configured = 0",
        )
        .bind(switch_ip)
        .bind(subnet_id)
        .execute(self.db.writer())
        .await
        .map_err(|e| StoreError::database("mark l2 configured", e))?;
        Ok(result.rows_affected() == 1)
    }

    /// Records the router and L3 segment attached on this switch.
    pub async fn attach_router(
        &self,
        switch_ip: &str,
        subnet_id: &str,
        router_id: &str,
        l3_segment_id: SegmentId,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE port_bindings SET router_id = ?, l3_segment_id = ? \
             WHERE switch_ip = ? AND subnet_id = ?",
        )
        .bind(router_id)
        .bind(i64::from(l3_segment_id.as_u32()))
        .bind(switch_ip)
        .bind(subnet_id)
        .execute(self.db.writer())
        .await
        .map_err(|e| StoreError::database("attach router", e))?;
        Ok(result.rows_affected() == 1)
    }

    /// Clears the router fields.
    pub async fn detach_router(&self, switch_ip: &str, subnet_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE port_bindings SET router_id = '', l3_segment_id = 0 \
             WHERE switch_ip = ? AND subnet_id = ?",
        )
        .bind(switch_ip)
        .bind(subnet_id)
        .execute(self.db.writer())
        .await
        .map_err(|e| StoreError::database("detach router", e))?;
        Ok(result.rows_affected() == 1)
    }

    /// Deletes the binding row.
    ///
    /// The caller must have checked that no port of the subnet remains on
    /// any host connected to the switch.
    pub async fn remove_if_unused(&self, switch_ip: &str, subnet_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM port_bindings WHERE switch_ip = ? AND subnet_id = ?")
            .bind(switch_ip)
            .bind(subnet_id)
            .execute(self.db.writer())
            .await
            .map_err(|e| StoreError::database("remove binding", e))?;

        let removed = result.rows_affected() == 1;
        if removed {
            debug!("Removed binding {} / {}", switch_ip, subnet_id);
        }
        Ok(removed)
    }

    /// Every switch carrying `subnet_id`, one binding per switch, ordered
    /// by switch IP.
    pub async fn find_by_switch(&self, subnet_id: &str) -> StoreResult<Vec<PortBinding>> {
        let sql = format!("{} WHERE subnet_id = ? ORDER BY switch_ip", SELECT_COLUMNS);
        let rows = sqlx::query_as::<_, BindingRow>(&sql)
            .bind(subnet_id)
            .fetch_all(self.db.reader())
            .await
            .map_err(|e| StoreError::database("find by switch", e))?;
        into_bindings(rows)
    }

    /// Bindings on `switch_ip` attached to `router_id`.
    pub async fn router_bindings_on_switch(
        &self,
        switch_ip: &str,
        router_id: &str,
    ) -> StoreResult<Vec<PortBinding>> {
        let sql = format!(
            "{} WHERE switch_ip = ? AND router_id = ? ORDER BY subnet_id",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, BindingRow>(&sql)
            .bind(switch_ip)
            .bind(router_id)
            .fetch_all(self.db.reader())
            .await
            .map_err(|e| StoreError::database("router bindings", e))?;
        into_bindings(rows)
    }

    /// All bindings, ordered by switch IP then subnet.
    pub async fn list(&self) -> StoreResult<Vec<PortBinding>> {
        let sql = format!("{} ORDER BY switch_ip, subnet_id", SELECT_COLUMNS);
        let rows = sqlx::query_as::<_, BindingRow>(&sql)
            .fetch_all(self.db.reader())
            .await
            .map_err(|e| StoreError::database("list bindings", e))?;
        into_bindings(rows)
    }
}
