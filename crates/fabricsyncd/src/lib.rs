//! fabricsyncd - overlay fabric synchronization
//!
//! Keeps leaf and border-leaf switch configuration in step with the
//! orchestrator's ports, subnets and routers:
//!
//! - [`SwitchConfigReconciler`] turns port lifecycle events into L2 and VRF
//!   interface pushes on the leaves serving the port's host
//! - [`RouterGatewayCoordinator`] handles routers, their external gateways
//!   on border leaves and their tenant interfaces
//! - [`OverlaySegmentDriver`] hands out overlay segments for networks
//! - [`FabricSync`] opens the store, reconciles the pools and wires the
//!   handlers at startup

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod reconciler;
pub mod router;
pub mod segment_driver;
pub mod topology;

pub use bootstrap::{reap_stranded, FabricSync, ReapReport, StatsReport, Stores, SyncSummary};
pub use config::{FabricSyncConfig, PoolRanges, DEFAULT_CONFIG_PATH};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{
    DynamicSegment, ExternalGateway, NetworkSegment, Orchestrator, OrchestratorError,
    OrchestratorResult, Port, PortEvent, PortFilter, PortSegments, Router, RouterInterface,
    Subnet,
};
pub use reconciler::{port_config_lock, PortConfigLock, SwitchConfigReconciler};
pub use router::RouterGatewayCoordinator;
pub use segment_driver::OverlaySegmentDriver;
pub use topology::{BorderSwitch, LeafSwitch, Topology};
