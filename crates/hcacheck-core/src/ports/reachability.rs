//! Gateway reachability port.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How a gateway answered, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMethod {
    Icmp,
    Tcp(u16),
}

/// Result of probing one gateway from one net device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reachability {
    pub reachable: bool,
    pub method: Option<ProbeMethod>,
    /// Why every probe failed. Empty when reachable.
    pub detail: String,
}

impl Reachability {
    pub const fn reachable(method: ProbeMethod) -> Self {
        Self {
            reachable: true,
            method: Some(method),
            detail: String::new(),
        }
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            reachable: false,
            method: None,
            detail: detail.into(),
        }
    }
}

/// Checks whether a gateway answers from a given net device.
///
/// Probe failures are part of the answer, not errors.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, net_dev: &str, gateway: Ipv4Addr) -> Reachability;
}
