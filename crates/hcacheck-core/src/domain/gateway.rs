//! Gateway resolution outcomes.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Why an adapter has no gateway to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoGatewayReason {
    /// InfiniBand-native link layer has no IP gateway.
    InfiniBandLinkLayer,
    /// The net device is administratively or operationally down.
    InterfaceDown,
    /// The link layer could not be determined.
    UnknownLinkLayer,
}

/// Result of resolving the egress gateway for a net device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GatewayResolution {
    NoGateway(NoGatewayReason),
    /// The device only carries IPv6; IPv4-specific checks should be skipped.
    Ipv6Only,
    Resolved(Ipv4Addr),
}

impl GatewayResolution {
    pub const fn address(&self) -> Option<Ipv4Addr> {
        match self {
            Self::Resolved(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoGateway(_) => Ok(()),
            Self::Ipv6Only => f.write_str("IPV6"),
            Self::Resolved(addr) => write!(f, "{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_resolved_has_address() {
        let gw = Ipv4Addr::new(10, 0, 0, 1);
        assert_eq!(GatewayResolution::Resolved(gw).address(), Some(gw));
        assert_eq!(GatewayResolution::Ipv6Only.address(), None);
        assert_eq!(
            GatewayResolution::NoGateway(NoGatewayReason::InterfaceDown).address(),
            None
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            GatewayResolution::Resolved(Ipv4Addr::new(192, 168, 1, 254)).to_string(),
            "192.168.1.254"
        );
        assert_eq!(GatewayResolution::Ipv6Only.to_string(), "IPV6");
        assert_eq!(
            GatewayResolution::NoGateway(NoGatewayReason::InfiniBandLinkLayer).to_string(),
            ""
        );
    }
}
