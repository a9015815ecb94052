//! L2 and L3 overlay segment pools.

use fabric_types::{RangeSet, SegmentId};
use tracing::instrument;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::pool::{self, PoolStats, PoolTable, SyncReport};

/// Allocator for one fabric-wide overlay segment pool.
///
/// Owners are router ids (L3 pool, router gateway segments in the L2 pool)
/// or network ids (tenant segments in the L2 pool).
#[derive(Debug, Clone)]
pub struct SegmentAllocator {
    db: Database,
    table: PoolTable,
    ranges: RangeSet,
}

impl SegmentAllocator {
    /// Creates the L2 segment pool allocator.
    pub fn l2(db: Database, ranges: RangeSet) -> Self {
        Self {
            db,
            table: PoolTable::L2_SEGMENT,
            ranges,
        }
    }

    /// Creates the L3 segment pool allocator.
    pub fn l3(db: Database, ranges: RangeSet) -> Self {
        Self {
            db,
            table: PoolTable::L3_SEGMENT,
            ranges,
        }
    }

    pub fn name(&self) -> &'static str {
        self.table.name
    }

    /// The configured ranges.
    pub fn ranges(&self) -> &RangeSet {
        &self.ranges
    }

    /// Returns true if `id` is inside the configured ranges.
    pub fn in_range(&self, id: SegmentId) -> bool {
        self.ranges.contains(id.as_u32())
    }

    fn segment(&self, raw: u32) -> StoreResult<SegmentId> {
        SegmentId::new(raw).map_err(|e| StoreError::corrupt(self.table.table, e.to_string()))
    }

    /// Reconciles the table with the configured ranges.
    #[instrument(skip(self), fields(pool = self.table.name))]
    pub async fn sync(&self) -> StoreResult<SyncReport> {
        pool::sync(&self.db, &self.table, None, &self.ranges).await
    }

    /// Allocates a segment for `owner`.
    #[instrument(skip(self), fields(pool = self.table.name))]
    pub async fn allocate(&self, owner: &str) -> StoreResult<SegmentId> {
        let raw = pool::allocate(&self.db, &self.table, None, &self.ranges, owner).await?;
        self.segment(raw)
    }

    /// Releases the segment held by `owner`; returns it if there was one.
    #[instrument(skip(self), fields(pool = self.table.name))]
    pub async fn release(&self, owner: &str) -> StoreResult<Option<SegmentId>> {
        let released = pool::release(&self.db, &self.table, None, &self.ranges, owner).await?;
        released.into_iter().next().map(|raw| self.segment(raw)).transpose()
    }

    /// Claims a specific segment for `owner`.
    pub async fn reserve(&self, id: SegmentId, owner: &str) -> StoreResult<()> {
        pool::reserve(&self.db, &self.table, None, id.as_u32(), owner).await
    }

    /// Frees a specific segment; returns false if it was unknown.
    pub async fn release_id(&self, id: SegmentId) -> StoreResult<bool> {
        pool::release_id(&self.db, &self.table, None, &self.ranges, id.as_u32()).await
    }

    /// The segment currently held by `owner`.
    pub async fn find_by_owner(&self, owner: &str) -> StoreResult<Option<SegmentId>> {
        pool::find_by_owner(&self.db, &self.table, None, owner)
            .await?
            .map(|raw| self.segment(raw))
            .transpose()
    }

    /// All owned segments with their owners.
    pub async fn owners(&self) -> StoreResult<Vec<(SegmentId, String)>> {
        pool::owned_rows(&self.db, &self.table)
            .await?
            .into_iter()
            .map(|row| Ok((self.segment(row.id)?, row.owner)))
            .collect()
    }

    pub async fn stats(&self) -> StoreResult<PoolStats> {
        pool::stats(&self.db, &self.table, None).await
    }
}
