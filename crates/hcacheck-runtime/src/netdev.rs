//! Net device facts from sysfs and procfs.

use std::path::Path;

use hcacheck_core::ports::{LinkInspector, RoutingError};
use hcacheck_core::LinkLayer;
use tracing::debug;

use crate::host::{HostPaths, list_dir, read_attr};

/// `/proc/net/if_inet6` scope values that are not global.
const LINK_LOCAL_SCOPE: &str = "20";
const HOST_SCOPE: &str = "10";

/// [`LinkInspector`] over `/sys/class/net` and `/proc/net/if_inet6`.
#[derive(Debug, Clone, Default)]
pub struct SysfsLinkInspector {
    paths: HostPaths,
}

impl SysfsLinkInspector {
    pub const fn new(paths: HostPaths) -> Self {
        Self { paths }
    }

    fn net_attr(&self, net_dev: &str, attr: &str) -> Result<String, RoutingError> {
        let dir = self.paths.net_dev(net_dev);
        if !dir.exists() {
            return Err(RoutingError::InterfaceNotFound(net_dev.to_string()));
        }
        let path = dir.join(attr);
        read_attr(&path).map_err(|e| RoutingError::Sysfs {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl LinkInspector for SysfsLinkInspector {
    fn link_layer(&self, net_dev: &str) -> Result<LinkLayer, RoutingError> {
        Ok(LinkLayer::from_arphrd(&self.net_attr(net_dev, "type")?))
    }

    fn is_up(&self, net_dev: &str) -> Result<bool, RoutingError> {
        Ok(self.net_attr(net_dev, "operstate")? == "up")
    }

    fn has_global_ipv6(&self, net_dev: &str) -> Result<bool, RoutingError> {
        let path = self.paths.if_inet6();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            // No IPv6 support in the kernel.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(RoutingError::Sysfs {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        Ok(parse_if_inet6(&text, net_dev))
    }
}

/// Whether `/proc/net/if_inet6` lists a global address for `net_dev`.
///
/// Columns: address, ifindex, prefix length, scope, flags, name.
fn parse_if_inet6(text: &str, net_dev: &str) -> bool {
    text.lines().any(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        matches!(
            fields.as_slice(),
            [_, _, _, scope, _, name] if *name == net_dev && *scope != LINK_LOCAL_SCOPE && *scope != HOST_SCOPE
        )
    })
}

/// Net device of an RDMA device, replaced by its bond master when enslaved.
///
/// Returns an empty string when the device has no net interface.
pub fn ib_dev_to_net_dev(paths: &HostPaths, ib_dev: &str) -> String {
    let net_dir = paths.ib_dev(ib_dev).join("device/net");
    let Some(net_dev) = list_dir(&net_dir).ok().and_then(|names| names.into_iter().next()) else {
        debug!(%ib_dev, "no net device");
        return String::new();
    };
    match bond_master(paths, &net_dev) {
        Some(bond) => {
            debug!(%ib_dev, slave = %net_dev, %bond, "net device is enslaved");
            bond
        }
        None => net_dev,
    }
}

/// The `bond*` device that lists `net_dev` among its slaves.
fn bond_master(paths: &HostPaths, net_dev: &str) -> Option<String> {
    let names = list_dir(&paths.net_class()).ok()?;
    names
        .into_iter()
        .filter(|name| name.starts_with("bond"))
        .find(|bond| is_slave_of(&paths.net_dev(bond), net_dev))
}

fn is_slave_of(bond_dir: &Path, net_dev: &str) -> bool {
    read_attr(&bond_dir.join("bonding/slaves"))
        .is_ok_and(|slaves| slaves.split_whitespace().any(|s| s == net_dev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;

    const IF_INET6: &str = "\
00000000000000000000000000000001 01 80 10 80       lo
fe80000000000000a288c2fffe123456 05 40 20 80     ib0
fe80000000000000a288c2fffe123457 06 40 20 80    eth2
20010db8000000000000000000000002 06 40 00 80    eth2
";

    #[test]
    fn test_link_layer_and_operstate() {
        let host = FakeHost::new();
        host.add_adapter("mlx5_0", "0000:1a:00.0", "MT_A", "ib0");
        host.write("sys/class/net/eth2/type", "1\n");
        host.write("sys/class/net/eth2/operstate", "down\n");

        let links = SysfsLinkInspector::new(host.paths());
        assert_eq!(links.link_layer("ib0").unwrap(), LinkLayer::InfiniBand);
        assert_eq!(links.link_layer("eth2").unwrap(), LinkLayer::Ethernet);
        assert!(links.is_up("ib0").unwrap());
        assert!(!links.is_up("eth2").unwrap());
        assert_eq!(
            links.is_up("eth9"),
            Err(RoutingError::InterfaceNotFound("eth9".to_string()))
        );
    }

    #[test]
    fn test_global_ipv6_ignores_link_local() {
        let host = FakeHost::new();
        host.write("proc/net/if_inet6", IF_INET6);
        let links = SysfsLinkInspector::new(host.paths());
        assert!(links.has_global_ipv6("eth2").unwrap());
        assert!(!links.has_global_ipv6("ib0").unwrap());
        assert!(!links.has_global_ipv6("lo").unwrap());
    }

    #[test]
    fn test_missing_if_inet6_means_no_ipv6() {
        let host = FakeHost::new();
        assert!(!SysfsLinkInspector::new(host.paths()).has_global_ipv6("eth0").unwrap());
    }

    #[test]
    fn test_net_dev_prefers_bond_master() {
        let host = FakeHost::new();
        host.add_adapter("mlx5_0", "0000:1a:00.0", "MT_A", "eth2");
        host.add_adapter("mlx5_1", "0000:1b:00.0", "MT_A", "eth3");
        host.write("sys/class/net/bond0/bonding/slaves", "eth2 eth4\n");

        let paths = host.paths();
        assert_eq!(ib_dev_to_net_dev(&paths, "mlx5_0"), "bond0");
        assert_eq!(ib_dev_to_net_dev(&paths, "mlx5_1"), "eth3");
        assert_eq!(ib_dev_to_net_dev(&paths, "mlx5_7"), "");
    }
}
