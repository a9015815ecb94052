//! Gateway address with prefix length.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// `gateway_ip/prefix_len`, the form switches expect for an interface
/// address (e.g. `10.10.10.1/24`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GatewayCidr {
    ip: IpAddr,
    prefix_len: u8,
}

impl GatewayCidr {
    /// Creates a gateway CIDR, checking the prefix against the address family.
    pub fn new(ip: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        let max = if ip.is_ipv4() { 32 } else { 128 };
        if prefix_len > max {
            return Err(ParseError::InvalidGatewayCidr(format!(
                "{}/{}",
                ip, prefix_len
            )));
        }
        Ok(Self { ip, prefix_len })
    }

    /// Combines an address with the prefix length of a subnet CIDR
    /// (`"10.10.10.0/24"`).
    pub fn from_subnet(ip: IpAddr, subnet_cidr: &str) -> Result<Self, ParseError> {
        let prefix_len = subnet_cidr
            .split_once('/')
            .and_then(|(_, len)| len.trim().parse::<u8>().ok())
            .ok_or_else(|| ParseError::InvalidGatewayCidr(subnet_cidr.to_string()))?;
        Self::new(ip, prefix_len)
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn is_ipv6(&self) -> bool {
        self.ip.is_ipv6()
    }
}

impl fmt::Display for GatewayCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_len)
    }
}

impl FromStr for GatewayCidr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidGatewayCidr(s.to_string());
        let (ip, len) = s.split_once('/').ok_or_else(invalid)?;
        let ip: IpAddr = ip.trim().parse().map_err(|_| invalid())?;
        let len: u8 = len.trim().parse().map_err(|_| invalid())?;
        Self::new(ip, len)
    }
}

impl TryFrom<String> for GatewayCidr {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<GatewayCidr> for String {
    fn from(cidr: GatewayCidr) -> String {
        cidr.to_string()
    }
}
