//! Generic range allocator over an `(id, owner)` table.
//!
//! Every pool table has an integer id column and an `owner` column where
//! the empty string means free. Scoped pools (the border-leaf VLAN pool)
//! add a scope column; every statement is then restricted to one scope
//! value and the scope predicate follows the parameters it qualifies.
//!
//! State machine per id:
//!
//! ```text
//! FREE --allocate--> OWNED --release (in range)--> FREE
//!                    OWNED --release (out of range)--> DELETED
//! FREE --sync (dropped from ranges)--> DELETED
//! ```

use std::collections::HashSet;

use fabric_types::RangeSet;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info, warn};

use crate::db::{lock_table, Database};
use crate::error::{StoreError, StoreResult};

/// Rows deleted or inserted per statement during sync.
pub const SYNC_CHUNK_SIZE: usize = 100;

/// Conditional-claim attempts before allocate reports a conflict.
pub const ALLOCATE_ATTEMPTS: usize = 5;

/// Static description of one allocation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolTable {
    /// Pool name used in logs and errors.
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    /// Column scoping the pool, if any.
    pub scope_column: Option<&'static str>,
}

impl PoolTable {
    pub const L2_SEGMENT: PoolTable = PoolTable {
        name: "l2_segment",
        table: "l2_segment_allocations",
        id_column: "id",
        scope_column: None,
    };

    pub const L3_SEGMENT: PoolTable = PoolTable {
        name: "l3_segment",
        table: "l3_segment_allocations",
        id_column: "id",
        scope_column: None,
    };

    pub const BORDER_VLAN: PoolTable = PoolTable {
        name: "border_vlan",
        table: "border_vlan_allocations",
        id_column: "vlan_id",
        scope_column: Some("switch_ip"),
    };

    /// `" AND <scope> = ?"` when a scope is given.
    fn scope_and(&self, scope: Option<&str>) -> String {
        match (self.scope_column, scope) {
            (Some(column), Some(_)) => format!(" AND {} = ?", column),
            _ => String::new(),
        }
    }

    /// `" WHERE <scope> = ?"` when a scope is given.
    fn scope_where(&self, scope: Option<&str>) -> String {
        match (self.scope_column, scope) {
            (Some(column), Some(_)) => format!(" WHERE {} = ?", column),
            _ => String::new(),
        }
    }

    fn to_id(&self, raw: i64) -> StoreResult<u32> {
        u32::try_from(raw)
            .map_err(|_| StoreError::corrupt(self.table, format!("id {} does not fit u32", raw)))
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub deleted: usize,
    /// Owned rows outside the configured ranges left in place.
    pub stranded: usize,
}

/// Row counts of one pool or scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// An owned allocation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRow {
    pub scope: Option<String>,
    pub id: u32,
    pub owner: String,
}

/// Reconciles the table against `ranges` for one scope.
///
/// Unowned rows outside the ranges are deleted, missing ids are inserted
/// free, and owned rows outside the ranges are preserved. Runs in a single
/// writer transaction holding the table write lock.
pub async fn sync(
    db: &Database,
    pool: &PoolTable,
    scope: Option<&str>,
    ranges: &RangeSet,
) -> StoreResult<SyncReport> {
    let mut tx = db.begin_write().await?;
    lock_table(&mut tx, pool.table).await?;

    let sql = format!(
        "SELECT {}, owner FROM {}{}",
        pool.id_column,
        pool.table,
        pool.scope_where(scope)
    );
    let mut query = sqlx::query_as::<_, (i64, String)>(&sql);
    if let Some(scope) = scope {
        query = query.bind(scope);
    }
    let rows = query
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::database("sync select", e))?;

    let mut existing = HashSet::with_capacity(rows.len());
    let mut to_delete = Vec::new();
    let mut stranded = 0;
    for (raw, owner) in rows {
        let id = pool.to_id(raw)?;
        existing.insert(id);
        if !ranges.contains(id) {
            if owner.is_empty() {
                to_delete.push(id);
            } else {
                stranded += 1;
            }
        }
    }
    let to_insert: Vec<u32> = ranges.iter().filter(|id| !existing.contains(id)).collect();

    for chunk in to_delete.chunks(SYNC_CHUNK_SIZE) {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "DELETE FROM {} WHERE owner = '' AND {} IN (",
            pool.table, pool.id_column
        ));
        let mut ids = qb.separated(", ");
        for id in chunk {
            ids.push_bind(i64::from(*id));
        }
        ids.push_unseparated(")");
        if let (Some(column), Some(scope)) = (pool.scope_column, scope) {
            qb.push(format!(" AND {} = ", column));
            qb.push_bind(scope.to_string());
        }
        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("sync delete", e))?;
    }

    for chunk in to_insert.chunks(SYNC_CHUNK_SIZE) {
        let columns = match pool.scope_column.filter(|_| scope.is_some()) {
            Some(column) => format!("{}, {}, owner", column, pool.id_column),
            None => format!("{}, owner", pool.id_column),
        };
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) ", pool.table, columns));
        qb.push_values(chunk, |mut row, id| {
            if let (Some(_), Some(scope)) = (pool.scope_column, scope) {
                row.push_bind(scope.to_string());
            }
            row.push_bind(i64::from(*id)).push_bind("");
        });
        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("sync insert", e))?;
    }

    tx.commit()
        .await
        .map_err(|e| StoreError::database("sync commit", e))?;

    let report = SyncReport {
        inserted: to_insert.len(),
        deleted: to_delete.len(),
        stranded,
    };
    if stranded > 0 {
        warn!(
            "Pool {} ({}) keeps {} owned ids outside ranges {}",
            pool.name,
            scope.unwrap_or("global"),
            stranded,
            ranges
        );
    }
    info!(
        "Synced pool {} ({}): {} inserted, {} deleted",
        pool.name,
        scope.unwrap_or("global"),
        report.inserted,
        report.deleted
    );
    Ok(report)
}

/// Returns the id held by `owner` in this scope, if any.
pub async fn find_by_owner(
    db: &Database,
    pool: &PoolTable,
    scope: Option<&str>,
    owner: &str,
) -> StoreResult<Option<u32>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE owner = ?{} LIMIT 1",
        pool.id_column,
        pool.table,
        pool.scope_and(scope)
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(owner);
    if let Some(scope) = scope {
        query = query.bind(scope);
    }
    let raw = query
        .fetch_optional(db.reader())
        .await
        .map_err(|e| StoreError::database("find by owner", e))?;
    raw.map(|raw| pool.to_id(raw)).transpose()
}

/// Claims a free id within `ranges` for `owner`.
///
/// An owner that already holds an id in this scope gets that id back.
/// Candidates are read without a lock and claimed with a conditional
/// update that also requires the owner to hold nothing yet, so concurrent
/// calls for one owner end up with a single id. A lost race re-reads the
/// owner and the free rows, and after [`ALLOCATE_ATTEMPTS`] lost races the
/// caller gets `Conflict`.
pub async fn allocate(
    db: &Database,
    pool: &PoolTable,
    scope: Option<&str>,
    ranges: &RangeSet,
    owner: &str,
) -> StoreResult<u32> {
    let select = format!(
        "SELECT {} FROM {} WHERE owner = ''{}",
        pool.id_column,
        pool.table,
        pool.scope_and(scope)
    );
    let claim = format!(
        "UPDATE {table} SET owner = ? WHERE {id} = ? AND owner = ''{scope} \
         AND NOT EXISTS (SELECT 1 FROM {table} WHERE owner = ?{scope})",
        table = pool.table,
        id = pool.id_column,
        scope = pool.scope_and(scope)
    );

    for attempt in 1..=ALLOCATE_ATTEMPTS {
        if let Some(id) = find_by_owner(db, pool, scope, owner).await? {
            debug!("{} already holds {} id {}", owner, pool.name, id);
            return Ok(id);
        }

        let mut query = sqlx::query_scalar::<_, i64>(&select);
        if let Some(scope) = scope {
            query = query.bind(scope);
        }
        let free = query
            .fetch_all(db.reader())
            .await
            .map_err(|e| StoreError::database("allocate select", e))?;

        // Any free row will do; the last one of the unordered result is taken.
        let mut candidate = None;
        for raw in free {
            let id = pool.to_id(raw)?;
            if ranges.contains(id) {
                candidate = Some(id);
            }
        }
        let Some(id) = candidate else {
            return Err(StoreError::exhausted(pool.name, scope));
        };

        let mut update = sqlx::query(&claim).bind(owner).bind(i64::from(id));
        if let Some(scope) = scope {
            update = update.bind(scope);
        }
        update = update.bind(owner);
        if let Some(scope) = scope {
            update = update.bind(scope);
        }
        let result = update
            .execute(db.writer())
            .await
            .map_err(|e| StoreError::database("allocate claim", e))?;

        if result.rows_affected() == 1 {
            debug!(
                "Allocated {} id {} to {} ({})",
                pool.name,
                id,
                owner,
                scope.unwrap_or("global")
            );
            return Ok(id);
        }
        debug!(
            "Lost race for {} id {} (attempt {}/{})",
            pool.name, id, attempt, ALLOCATE_ATTEMPTS
        );
    }

    if let Some(id) = find_by_owner(db, pool, scope, owner).await? {
        return Ok(id);
    }
    Err(StoreError::conflict(
        pool.name,
        format!(
            "could not claim an id for {} after {} attempts",
            owner, ALLOCATE_ATTEMPTS
        ),
    ))
}

/// Frees one row: cleared if still in range, deleted otherwise.
async fn free_row(
    conn: &mut sqlx::SqliteConnection,
    pool: &PoolTable,
    scope: Option<&str>,
    ranges: &RangeSet,
    id: u32,
) -> StoreResult<()> {
    let sql = if ranges.contains(id) {
        format!(
            "UPDATE {} SET owner = '' WHERE {} = ?{}",
            pool.table,
            pool.id_column,
            pool.scope_and(scope)
        )
    } else {
        format!(
            "DELETE FROM {} WHERE {} = ?{}",
            pool.table,
            pool.id_column,
            pool.scope_and(scope)
        )
    };
    let mut query = sqlx::query(&sql).bind(i64::from(id));
    if let Some(scope) = scope {
        query = query.bind(scope);
    }
    query
        .execute(conn)
        .await
        .map_err(|e| StoreError::database("release", e))?;
    Ok(())
}

/// Releases every id held by `owner` in this scope.
///
/// Ids still inside `ranges` return to the pool; ids the ranges no longer
/// cover are deleted. Releasing an owner that holds nothing is a no-op.
pub async fn release(
    db: &Database,
    pool: &PoolTable,
    scope: Option<&str>,
    ranges: &RangeSet,
    owner: &str,
) -> StoreResult<Vec<u32>> {
    let mut tx = db.begin_write().await?;
    lock_table(&mut tx, pool.table).await?;

    let sql = format!(
        "SELECT {} FROM {} WHERE owner = ?{}",
        pool.id_column,
        pool.table,
        pool.scope_and(scope)
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(owner);
    if let Some(scope) = scope {
        query = query.bind(scope);
    }
    let held = query
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::database("release select", e))?;

    let mut released = Vec::with_capacity(held.len());
    for raw in held {
        let id = pool.to_id(raw)?;
        free_row(&mut tx, pool, scope, ranges, id).await?;
        released.push(id);
    }

    tx.commit()
        .await
        .map_err(|e| StoreError::database("release commit", e))?;

    if !released.is_empty() {
        debug!(
            "Released {} ids {:?} held by {} ({})",
            pool.name,
            released,
            owner,
            scope.unwrap_or("global")
        );
    }
    Ok(released)
}

/// Claims the specific id `id` for `owner`.
///
/// An id with no row (outside the ranges, or not yet synced) is inserted
/// owned. Reserving an id the owner already holds succeeds; an id owned
/// by someone else is a `Conflict`.
pub async fn reserve(
    db: &Database,
    pool: &PoolTable,
    scope: Option<&str>,
    id: u32,
    owner: &str,
) -> StoreResult<()> {
    let mut tx = db.begin_write().await?;
    lock_table(&mut tx, pool.table).await?;

    let sql = format!(
        "SELECT owner FROM {} WHERE {} = ?{}",
        pool.table,
        pool.id_column,
        pool.scope_and(scope)
    );
    let mut query = sqlx::query_scalar::<_, String>(&sql).bind(i64::from(id));
    if let Some(scope) = scope {
        query = query.bind(scope);
    }
    let current = query
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::database("reserve select", e))?;

    match current {
        None => {
            let sql = match pool.scope_column.filter(|_| scope.is_some()) {
                Some(column) => format!(
                    "INSERT INTO {} ({}, owner, {}) VALUES (?, ?, ?)",
                    pool.table, pool.id_column, column
                ),
                None => format!(
                    "INSERT INTO {} ({}, owner) VALUES (?, ?)",
                    pool.table, pool.id_column
                ),
            };
            let mut insert = sqlx::query(&sql).bind(i64::from(id)).bind(owner);
            if let Some(scope) = scope {
                insert = insert.bind(scope);
            }
            insert
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::database("reserve insert", e))?;
        }
        Some(current) if current.is_empty() => {
            let sql = format!(
                "UPDATE {} SET owner = ? WHERE {} = ? AND owner = ''{}",
                pool.table,
                pool.id_column,
                pool.scope_and(scope)
            );
            let mut update = sqlx::query(&sql).bind(owner).bind(i64::from(id));
            if let Some(scope) = scope {
                update = update.bind(scope);
            }
            update
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::database("reserve update", e))?;
        }
        Some(current) if current == owner => {}
        Some(current) => {
            return Err(StoreError::conflict(
                pool.name,
                format!("id {} is already owned by {}", id, current),
            ));
        }
    }

    tx.commit()
        .await
        .map_err(|e| StoreError::database("reserve commit", e))?;
    debug!("Reserved {} id {} for {}", pool.name, id, owner);
    Ok(())
}

/// Frees the id `id` regardless of owner, with the same in-range rule as
/// [`release`]. Returns false if no row exists.
pub async fn release_id(
    db: &Database,
    pool: &PoolTable,
    scope: Option<&str>,
    ranges: &RangeSet,
    id: u32,
) -> StoreResult<bool> {
    let mut tx = db.begin_write().await?;
    lock_table(&mut tx, pool.table).await?;

    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?{}",
        pool.table,
        pool.id_column,
        pool.scope_and(scope)
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(i64::from(id));
    if let Some(scope) = scope {
        query = query.bind(scope);
    }
    let exists = query
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::database("release id select", e))?
        > 0;

    if exists {
        free_row(&mut tx, pool, scope, ranges, id).await?;
    }
    tx.commit()
        .await
        .map_err(|e| StoreError::database("release id commit", e))?;
    Ok(exists)
}

/// Lists every owned row of the table, across all scopes.
pub async fn owned_rows(db: &Database, pool: &PoolTable) -> StoreResult<Vec<OwnedRow>> {
    let scope_select = pool.scope_column.unwrap_or("NULL");
    let sql = format!(
        "SELECT {}, {}, owner FROM {} WHERE owner != ''",
        scope_select, pool.id_column, pool.table
    );
    let rows = sqlx::query_as::<_, (Option<String>, i64, String)>(&sql)
        .fetch_all(db.reader())
        .await
        .map_err(|e| StoreError::database("owned rows", e))?;

    rows.into_iter()
        .map(|(scope, raw, owner)| {
            Ok(OwnedRow {
                scope,
                id: pool.to_id(raw)?,
                owner,
            })
        })
        .collect()
}

/// Distinct scope values present in a scoped table.
pub async fn scopes(db: &Database, pool: &PoolTable) -> StoreResult<Vec<String>> {
    let Some(column) = pool.scope_column else {
        return Ok(Vec::new());
    };
    let sql = format!(
        "SELECT DISTINCT {} FROM {} ORDER BY {}",
        column, pool.table, column
    );
    sqlx::query_scalar::<_, String>(&sql)
        .fetch_all(db.reader())
        .await
        .map_err(|e| StoreError::database("scopes", e))
}

/// Counts total, used and free rows for one scope.
pub async fn stats(db: &Database, pool: &PoolTable, scope: Option<&str>) -> StoreResult<PoolStats> {
    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN owner = '' THEN 0 ELSE 1 END), 0) FROM {}{}",
        pool.table,
        pool.scope_where(scope)
    );
    let mut query = sqlx::query_as::<_, (i64, i64)>(&sql);
    if let Some(scope) = scope {
        query = query.bind(scope);
    }
    let (total, used) = query
        .fetch_one(db.reader())
        .await
        .map_err(|e| StoreError::database("stats", e))?;

    let total = u64::try_from(total).unwrap_or_default();
    let used = u64::try_from(used).unwrap_or_default();
    Ok(PoolStats {
        total,
        used,
        free: total.saturating_sub(used),
    })
}
