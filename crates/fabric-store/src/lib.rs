//! Persistent state of the fabric synchronizer.
//!
//! This crate owns the only shared mutable resources of the system:
//!
//! - [`SegmentAllocator`]: the L2 and L3 overlay segment pools
//! - [`BorderVlanAllocator`]: per-switch VLAN pools of the border leaves
//! - [`BindingStore`]: one row per (switch, subnet) carrying configuration
//!
//! All three sit on the [`Database`] reader/writer pools. Mutations use
//! conditional statements or table-locked transactions so that they stay
//! correct across processes sharing the same database.

pub mod binding;
pub mod border_vlan;
pub mod db;
pub mod error;
pub mod pool;
pub mod segment_pool;

pub use binding::{BindingStore, PortBinding};
pub use border_vlan::BorderVlanAllocator;
pub use db::{Database, DatabaseConfig};
pub use error::{StoreError, StoreResult};
pub use pool::{PoolStats, PoolTable, SyncReport};
pub use segment_pool::SegmentAllocator;
