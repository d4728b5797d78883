//! Routing and link inspection ports.
//!
//! These expose the kernel's IPv4 addresses, policy rules and routing tables
//! as plain data. Selecting a gateway from that data is done in
//! [`crate::services::GatewayResolver`], not by asking the kernel.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::LinkLayer;

/// Errors from routing and link queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Netlink {op} request failed: {reason}")]
    Netlink { op: &'static str, reason: String },

    #[error("Failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("Network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Failed to read {path}: {reason}")]
    Sysfs { path: String, reason: String },
}

/// An IPv4 prefix such as `10.0.0.0/24`. A bare address is a `/32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ipv4Cidr {
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Cidr {
    pub const fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        Self { addr, prefix_len }
    }

    fn mask(self) -> u32 {
        match self.prefix_len {
            0 => 0,
            len if len >= 32 => u32::MAX,
            len => u32::MAX << (32 - u32::from(len)),
        }
    }

    pub fn contains(self, ip: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(self.addr) & mask == u32::from(ip) & mask
    }
}

impl FromStr for Ipv4Cidr {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = |reason: String| RoutingError::Parse {
            what: format!("IPv4 prefix '{s}'"),
            reason,
        };
        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, len.parse::<u8>().map_err(|e| parse_err(e.to_string()))?),
            None => (s, 32),
        };
        if len > 32 {
            return Err(parse_err(format!("prefix length {len} exceeds 32")));
        }
        let addr = addr
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|e| parse_err(e.to_string()))?;
        Ok(Self::new(addr, len))
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// A policy routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Lower values are evaluated first.
    pub priority: u32,
    /// Source selector; `None` matches every source.
    pub source: Option<Ipv4Cidr>,
    /// Target table by name or number (`main`, `local`, `100`).
    pub table: String,
}

impl PolicyRule {
    pub fn matches_source(&self, ip: Ipv4Addr) -> bool {
        self.source.is_none_or(|src| src.addr == ip || src.contains(ip))
    }
}

/// One IPv4 route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// `None` for a default route.
    pub destination: Option<Ipv4Cidr>,
    pub gateway: Option<Ipv4Addr>,
    pub device: Option<String>,
}

impl RouteEntry {
    pub const fn is_default(&self) -> bool {
        self.destination.is_none()
    }
}

/// Source of IPv4 addressing and routing data.
#[async_trait]
pub trait RouteSource: Send + Sync {
    /// IPv4 addresses assigned to `net_dev`, in kernel listing order.
    async fn ipv4_addresses(&self, net_dev: &str) -> Result<Vec<Ipv4Cidr>, RoutingError>;

    /// All IPv4 policy rules, in any order.
    async fn policy_rules(&self) -> Result<Vec<PolicyRule>, RoutingError>;

    /// Routes in one routing table.
    async fn table_routes(&self, table: &str) -> Result<Vec<RouteEntry>, RoutingError>;

    /// Routes bound to `net_dev` in the main table, ignoring policy.
    async fn interface_routes(&self, net_dev: &str) -> Result<Vec<RouteEntry>, RoutingError>;
}

/// Cheap link facts read from sysfs/procfs.
pub trait LinkInspector: Send + Sync {
    fn link_layer(&self, net_dev: &str) -> Result<LinkLayer, RoutingError>;

    fn is_up(&self, net_dev: &str) -> Result<bool, RoutingError>;

    /// Whether `net_dev` has a non-link-local IPv6 address.
    fn has_global_ipv6(&self, net_dev: &str) -> Result<bool, RoutingError>;
}
