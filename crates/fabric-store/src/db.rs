//! SQLite connection handling and schema.
//!
//! Two pools share one database file: a single-connection writer pool,
//! which serialises every mutating transaction of this process, and a reader
//! pool used for lock-free lookups. Decisions taken from the reader are
//! always re-verified by a conditional statement on the writer.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::info;

use crate::error::{StoreError, StoreResult};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS l2_segment_allocations (
        id INTEGER PRIMARY KEY NOT NULL,
        owner TEXT NOT NULL DEFAULT ''
    )",
    "CREATE INDEX IF NOT EXISTS idx_l2_segment_owner ON l2_segment_allocations (owner)",
    "CREATE TABLE IF NOT EXISTS l3_segment_allocations (
        id INTEGER PRIMARY KEY NOT NULL,
        owner TEXT NOT NULL DEFAULT ''
    )",
    "CREATE INDEX IF NOT EXISTS idx_l3_segment_owner ON l3_segment_allocations (owner)",
    "CREATE TABLE IF NOT EXISTS border_vlan_allocations (
        switch_ip TEXT NOT NULL,
        vlan_id INTEGER NOT NULL,
        owner TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (switch_ip, vlan_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_border_vlan_owner ON border_vlan_allocations (owner)",
    "CREATE TABLE IF NOT EXISTS port_bindings (
        binding_id INTEGER PRIMARY KEY AUTOINCREMENT,
        switch_ip TEXT NOT NULL,
        vlan_id INTEGER NOT NULL,
        l2_segment_id INTEGER NOT NULL,
        is_l2_configured INTEGER NOT NULL DEFAULT 0,
        subnet_id TEXT NOT NULL,
        router_id TEXT NOT NULL DEFAULT '',
        l3_segment_id INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_port_bindings_switch_subnet
        ON port_bindings (switch_ip, subnet_id)",
    "CREATE INDEX IF NOT EXISTS idx_port_bindings_subnet ON port_bindings (subnet_id)",
];

fn default_path() -> PathBuf {
    PathBuf::from("/var/lib/fabricsync/fabricsync.db")
}

fn default_max_readers() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Database location and pool sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file; created if missing.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Connections in the reader pool.
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    /// How long a statement waits on a lock held by another process.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_readers: default_max_readers(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Creates a config for the given file with default pool sizing.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Handle to the reader and writer pools. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    reader: SqlitePool,
    writer: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database and applies the schema.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await
            .map_err(|e| StoreError::database("connect writer", e))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&writer)
                .await
                .map_err(|e| StoreError::database("create schema", e))?;
        }

        let reader = SqlitePoolOptions::new()
            .max_connections(config.max_readers.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::database("connect reader", e))?;

        info!("Opened fabric store at {}", config.path.display());

        Ok(Self { reader, writer })
    }

    /// Pool for lock-free reads.
    pub fn reader(&self) -> &SqlitePool {
        &self.reader
    }

    /// Single-connection pool for mutations.
    pub fn writer(&self) -> &SqlitePool {
        &self.writer
    }

    /// Starts a writer transaction.
    pub async fn begin_write(&self) -> StoreResult<Transaction<'static, Sqlite>> {
        self.writer
            .begin()
            .await
            .map_err(|e| StoreError::database("begin", e))
    }

    /// Closes both pools.
    pub async fn close(&self) {
        self.reader.close().await;
        self.writer.close().await;
    }
}

/// Takes the write lock for `table` inside the current transaction.
///
/// SQLite has no row locks; a zero-row write upgrades the transaction to a
/// reserved lock, after which no other writer can touch the table until
/// commit.
pub(crate) async fn lock_table(conn: &mut SqliteConnection, table: &str) -> StoreResult<()> {
    let sql = format!("UPDATE {} SET owner = owner WHERE 0", table);
    sqlx::query(&sql)
        .execute(conn)
        .await
        .map_err(|e| StoreError::database(format!("lock {}", table), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_connect_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(&DatabaseConfig::with_path(dir.path().join("store.db")))
            .await
            .unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(db.reader())
        .await
        .unwrap();
        let names: Vec<String> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(
            names,
            vec![
                "border_vlan_allocations",
                "l2_segment_allocations",
                "l3_segment_allocations",
                "port_bindings"
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::with_path(dir.path().join("store.db"));
        let first = Database::connect(&config).await.unwrap();
        first.close().await;
        assert!(Database::connect(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_table_inside_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(&DatabaseConfig::with_path(dir.path().join("store.db")))
            .await
            .unwrap();
        let mut tx = db.begin_write().await.unwrap();
        lock_table(&mut tx, "l3_segment_allocations").await.unwrap();
        tx.commit().await.unwrap();
    }

    #[test]
    fn test_config_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_readers, 4);
        assert_eq!(config.busy_timeout_ms, 5000);
    }
}
