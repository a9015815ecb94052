//! Daemon configuration file.
//!
//! TOML with one table per concern. Every field has a default so a partial
//! file is valid; [`FabricSyncConfig::validate`] parses the pool ranges and
//! rejects malformed topology entries before anything touches the store.

use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use fabric_client::FabricConfig;
use fabric_store::DatabaseConfig;
use fabric_types::{parse_ranges, PoolBounds, RangeSet};
use serde::Deserialize;

use crate::error::{SyncError, SyncResult};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fabricsync/fabricsyncd.toml";

/// Overlay segment pools.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolsConfig {
    /// `"min:max"` entries for the L2 segment pool.
    #[serde(default)]
    pub l2_segment_ranges: Vec<String>,

    /// `"min:max"` entries for the L3 segment pool.
    #[serde(default)]
    pub l3_segment_ranges: Vec<String>,
}

/// A leaf switch and the hosts cabled to it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeafSwitchConfig {
    /// Physical network the switch trunks.
    #[serde(default)]
    pub physnet: Option<String>,

    /// Host name to switch interfaces.
    #[serde(default)]
    pub host_ports_mapping: BTreeMap<String, Vec<String>>,
}

/// A border leaf terminating external gateways.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BorderSwitchConfig {
    /// `"min:max"` entries for this switch's VLAN pool.
    #[serde(default)]
    pub vlan_ranges: Vec<String>,

    /// Physical network to switch interfaces.
    #[serde(default)]
    pub physical_network_ports_mapping: BTreeMap<String, Vec<String>>,
}

/// External network type settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalNetworksConfig {
    /// Physical networks external networks may use. Empty allows any.
    #[serde(default)]
    pub allowed_physnets: Vec<String>,
}

/// The whole daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FabricSyncConfig {
    #[serde(default)]
    pub fabric: FabricConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub pools: PoolsConfig,

    /// Keyed by switch management IP.
    #[serde(default)]
    pub leaf_switches: BTreeMap<String, LeafSwitchConfig>,

    /// Keyed by switch management IP.
    #[serde(default)]
    pub border_switches: BTreeMap<String, BorderSwitchConfig>,

    #[serde(default)]
    pub external_networks: ExternalNetworksConfig,
}

/// Parsed pool ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRanges {
    pub l2_segment: RangeSet,
    pub l3_segment: RangeSet,
    /// Border VLAN ranges per switch IP.
    pub border_vlan: BTreeMap<String, RangeSet>,
}

impl FabricSyncConfig {
    /// Loads the configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::config(path.display().to_string(), format!("cannot read: {}", e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| SyncError::config(path.display().to_string(), e.to_string()))
    }

    /// Parses the configuration from TOML text.
    pub fn from_toml_str(content: &str) -> SyncResult<Self> {
        toml::from_str(content).map_err(|e| SyncError::config("toml", e.to_string()))
    }

    /// Checks the topology and parses every pool range.
    pub fn validate(&self) -> SyncResult<PoolRanges> {
        let l2_segment = parse_ranges(&self.pools.l2_segment_ranges, PoolBounds::L2_SEGMENT)
            .map_err(|e| SyncError::config("pools.l2_segment_ranges", e.to_string()))?;
        let l3_segment = parse_ranges(&self.pools.l3_segment_ranges, PoolBounds::L3_SEGMENT)
            .map_err(|e| SyncError::config("pools.l3_segment_ranges", e.to_string()))?;

        for (ip, leaf) in &self.leaf_switches {
            check_switch_ip("leaf_switches", ip)?;
            if let Some(physnet) = &leaf.physnet {
                if physnet.trim().is_empty() {
                    return Err(SyncError::config(
                        format!("leaf_switches.{}.physnet", ip),
                        "empty physical network",
                    ));
                }
            }
            for host in leaf.host_ports_mapping.keys() {
                if host.trim().is_empty() {
                    return Err(SyncError::config(
                        format!("leaf_switches.{}.host_ports_mapping", ip),
                        "empty host name",
                    ));
                }
            }
        }

        let mut border_vlan = BTreeMap::new();
        for (ip, border) in &self.border_switches {
            check_switch_ip("border_switches", ip)?;
            for physnet in border.physical_network_ports_mapping.keys() {
                if physnet.trim().is_empty() {
                    return Err(SyncError::config(
                        format!("border_switches.{}.physical_network_ports_mapping", ip),
                        "empty physical network",
                    ));
                }
            }
            let ranges = parse_ranges(&border.vlan_ranges, PoolBounds::BORDER_VLAN).map_err(|e| {
                SyncError::config(format!("border_switches.{}.vlan_ranges", ip), e.to_string())
            })?;
            border_vlan.insert(ip.clone(), ranges);
        }

        Ok(PoolRanges {
            l2_segment,
            l3_segment,
            border_vlan,
        })
    }
}

fn check_switch_ip(table: &str, ip: &str) -> SyncResult<()> {
    ip.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| SyncError::config(table, format!("'{}' is not a switch IP address", ip)))
}
