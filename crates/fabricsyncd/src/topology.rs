//! Static cabling map between hosts, leaf switches and border leaves.

use std::collections::BTreeMap;

use crate::config::FabricSyncConfig;

/// A leaf switch with the hosts cabled to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSwitch {
    pub ip: String,
    pub physnet: Option<String>,
    /// Host name to switch interfaces.
    pub host_ports: BTreeMap<String, Vec<String>>,
}

impl LeafSwitch {
    pub fn hosts(&self) -> Vec<String> {
        self.host_ports.keys().cloned().collect()
    }

    /// Every interface towards any host, in host order without repeats.
    pub fn interfaces(&self) -> Vec<String> {
        let mut interfaces: Vec<String> = Vec::new();
        for ports in self.host_ports.values() {
            for port in ports {
                if !interfaces.contains(port) {
                    interfaces.push(port.clone());
                }
            }
        }
        interfaces
    }

    pub fn serves_physnet(&self, physnet: &str) -> bool {
        self.physnet.as_deref() == Some(physnet)
    }
}

/// A border leaf with its interfaces per physical network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderSwitch {
    pub ip: String,
    pub physnet_ports: BTreeMap<String, Vec<String>>,
}

/// Host and switch connectivity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    leaves: Vec<LeafSwitch>,
    borders: Vec<BorderSwitch>,
}

impl Topology {
    pub fn new(leaves: Vec<LeafSwitch>, borders: Vec<BorderSwitch>) -> Self {
        Self { leaves, borders }
    }

    pub fn from_config(config: &FabricSyncConfig) -> Self {
        let leaves = config
            .leaf_switches
            .iter()
            .map(|(ip, leaf)| LeafSwitch {
                ip: ip.clone(),
                physnet: leaf.physnet.clone().filter(|p| !p.is_empty()),
                host_ports: leaf.host_ports_mapping.clone(),
            })
            .collect();
        let borders = config
            .border_switches
            .iter()
            .map(|(ip, border)| BorderSwitch {
                ip: ip.clone(),
                physnet_ports: border.physical_network_ports_mapping.clone(),
            })
            .collect();
        Self { leaves, borders }
    }

    pub fn leaf(&self, ip: &str) -> Option<&LeafSwitch> {
        self.leaves.iter().find(|l| l.ip == ip)
    }

    /// Leaf switches a host is cabled to.
    pub fn switches_for_host(&self, host: &str) -> Vec<&LeafSwitch> {
        self.leaves
            .iter()
            .filter(|l| l.host_ports.contains_key(host))
            .collect()
    }

    /// Physical network of the first connected switch that declares one.
    pub fn physnet_for_host(&self, host: &str) -> Option<&str> {
        self.switches_for_host(host)
            .into_iter()
            .find_map(|l| l.physnet.as_deref())
    }

    /// Border leaves carrying `physnet`, with the interfaces for it.
    pub fn border_switches_for_physnet(&self, physnet: &str) -> Vec<(&str, &[String])> {
        self.borders
            .iter()
            .filter_map(|b| {
                b.physnet_ports
                    .get(physnet)
                    .map(|ports| (b.ip.as_str(), ports.as_slice()))
            })
            .collect()
    }

    /// Interfaces of a border leaf for `physnet`; empty if unknown.
    pub fn border_interfaces(&self, ip: &str, physnet: &str) -> Vec<String> {
        self.borders
            .iter()
            .find(|b| b.ip == ip)
            .and_then(|b| b.physnet_ports.get(physnet))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ports(entries: Vec<(&str, Vec<&str>)>) -> BTreeMap<String, Vec<String>> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn topology() -> Topology {
        Topology::new(
            vec![
                LeafSwitch {
                    ip: "10.0.0.1".to_string(),
                    physnet: None,
                    host_ports: ports(vec![("compute1", vec!["X1"])]),
                },
                LeafSwitch {
                    ip: "10.0.0.2".to_string(),
                    physnet: Some("provider".to_string()),
                    host_ports: ports(vec![
                        ("compute1", vec!["X25", "X26"]),
                        ("compute2", vec!["X26", "X29"]),
                    ]),
                },
            ],
            vec![BorderSwitch {
                ip: "10.0.0.9".to_string(),
                physnet_ports: ports(vec![("fw1", vec!["X29"]), ("fw2", vec!["X27", "X28"])]),
            }],
        )
    }

    #[test]
    fn test_switches_for_host() {
        let topo = topology();
        let ips: Vec<&str> = topo
            .switches_for_host("compute1")
            .iter()
            .map(|l| l.ip.as_str())
            .collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(topo.switches_for_host("compute9").is_empty());
    }

    #[test]
    fn test_physnet_skips_switches_without_one() {
        let topo = topology();
        assert_eq!(topo.physnet_for_host("compute1"), Some("provider"));
        assert_eq!(topo.physnet_for_host("compute9"), None);
    }

    #[test]
    fn test_leaf_interfaces_span_all_hosts() {
        let topo = topology();
        let leaf = topo.leaf("10.0.0.2").unwrap();
        assert_eq!(leaf.interfaces(), vec!["X25", "X26", "X29"]);
        assert_eq!(leaf.hosts(), vec!["compute1", "compute2"]);
        assert!(leaf.serves_physnet("provider"));
    }

    #[test]
    fn test_border_lookup() {
        let topo = topology();
        let borders = topo.border_switches_for_physnet("fw2");
        assert_eq!(borders.len(), 1);
        assert_eq!(borders[0].0, "10.0.0.9");
        assert_eq!(borders[0].1.to_vec(), vec!["X27", "X28"]);
        assert!(topo.border_switches_for_physnet("fw3").is_empty());
        assert_eq!(topo.border_interfaces("10.0.0.9", "fw1"), vec!["X29"]);
        assert!(topo.border_interfaces("10.0.0.8", "fw1").is_empty());
    }
}
