//! IPv4 routing data read straight from the kernel over rtnetlink.
//!
//! Only dumps are issued (links, addresses, rules, routes). Picking a gateway
//! out of the returned rules and tables is done by the core resolver.

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use hcacheck_core::ports::{
    DEFAULT_COMMAND_TIMEOUT, Ipv4Cidr, PolicyRule, RouteEntry, RouteSource, RoutingError,
};
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{LinkAttribute, LinkMessage};
use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteMessage};
use netlink_packet_route::rule::{RuleAttribute, RuleMessage};
use rtnetlink::{Handle, IpVersion};
use tracing::{debug, trace};

const RT_TABLE_UNSPEC: u32 = 0;
const RT_TABLE_DEFAULT: u32 = 253;
const RT_TABLE_MAIN: u32 = 254;
const RT_TABLE_LOCAL: u32 = 255;

/// [`RouteSource`] backed by an rtnetlink socket.
///
/// Each query opens its own connection, so the source holds no socket
/// between collection passes.
pub struct NetlinkRouteSource {
    timeout: Duration,
}

impl Default for NetlinkRouteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NetlinkRouteSource {
    pub const fn new() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn connect(&self) -> Result<Handle, RoutingError> {
        let (connection, handle, _) = rtnetlink::new_connection().map_err(|e| RoutingError::Netlink {
            op: "connect",
            reason: e.to_string(),
        })?;
        tokio::spawn(connection);
        Ok(handle)
    }

    /// Run one dump with the configured deadline.
    async fn bounded<T, Fut>(&self, op: &'static str, dump: Fut) -> Result<T, RoutingError>
    where
        Fut: Future<Output = Result<T, rtnetlink::Error>>,
    {
        match tokio::time::timeout(self.timeout, dump).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RoutingError::Netlink {
                op,
                reason: e.to_string(),
            }),
            Err(_) => Err(RoutingError::Netlink {
                op,
                reason: format!("timed out after {:?}", self.timeout),
            }),
        }
    }

    async fn links(&self, handle: &Handle) -> Result<Vec<LinkMessage>, RoutingError> {
        self.bounded("link dump", handle.link().get().execute().try_collect())
            .await
    }

    async fn routes(&self, handle: &Handle) -> Result<Vec<RouteMessage>, RoutingError> {
        self.bounded(
            "route dump",
            handle.route().get(IpVersion::V4).execute().try_collect(),
        )
        .await
    }

    async fn link_index(&self, handle: &Handle, net_dev: &str) -> Result<u32, RoutingError> {
        let links = self.links(handle).await?;
        link_names(&links)
            .into_iter()
            .find_map(|(index, name)| (name == net_dev).then_some(index))
            .ok_or_else(|| RoutingError::InterfaceNotFound(net_dev.to_string()))
    }
}

/// Name of a routing table id as iproute2 prints it.
pub fn table_name(id: u32) -> String {
    match id {
        RT_TABLE_DEFAULT => "default".to_string(),
        RT_TABLE_MAIN => "main".to_string(),
        RT_TABLE_LOCAL => "local".to_string(),
        other => other.to_string(),
    }
}

/// Inverse of [`table_name`].
pub fn table_id(name: &str) -> Result<u32, RoutingError> {
    match name {
        "default" => Ok(RT_TABLE_DEFAULT),
        "main" => Ok(RT_TABLE_MAIN),
        "local" => Ok(RT_TABLE_LOCAL),
        other => other.parse().map_err(|e: std::num::ParseIntError| RoutingError::Parse {
            what: format!("routing table '{other}'"),
            reason: e.to_string(),
        }),
    }
}

fn link_names(links: &[LinkMessage]) -> HashMap<u32, String> {
    links
        .iter()
        .filter_map(|link| {
            link.attributes.iter().find_map(|attr| match attr {
                LinkAttribute::IfName(name) => Some((link.header.index, name.clone())),
                _ => None,
            })
        })
        .collect()
}

/// IPv4 addresses on interface `index`, in dump order.
fn interface_addresses(messages: &[AddressMessage], index: u32) -> Vec<Ipv4Cidr> {
    messages
        .iter()
        .filter(|msg| msg.header.index == index)
        .filter_map(|msg| {
            // IFA_LOCAL is the interface's own address; IFA_ADDRESS is the
            // peer on point-to-point links.
            let local = msg.attributes.iter().find_map(|attr| match attr {
                AddressAttribute::Local(IpAddr::V4(ip)) => Some(*ip),
                _ => None,
            });
            let address = msg.attributes.iter().find_map(|attr| match attr {
                AddressAttribute::Address(IpAddr::V4(ip)) => Some(*ip),
                _ => None,
            });
            local
                .or(address)
                .map(|ip| Ipv4Cidr::new(ip, msg.header.prefix_len))
        })
        .collect()
}

/// Convert a rule message. Rules without a lookup table (`goto`,
/// `unreachable`, ...) yield `None`.
fn policy_rule(msg: &RuleMessage) -> Option<PolicyRule> {
    let mut priority = 0;
    let mut source = None;
    let mut table = u32::from(msg.header.table);
    for attr in &msg.attributes {
        match attr {
            RuleAttribute::Priority(p) => priority = *p,
            RuleAttribute::Source(IpAddr::V4(ip)) => {
                source = Some(Ipv4Cidr::new(*ip, msg.header.src_len));
            }
            RuleAttribute::Table(t) => table = *t,
            _ => {}
        }
    }
    if table == RT_TABLE_UNSPEC {
        return None;
    }
    Some(PolicyRule {
        priority,
        source,
        table: table_name(table),
    })
}

fn route_table(msg: &RouteMessage) -> u32 {
    msg.attributes
        .iter()
        .find_map(|attr| match attr {
            RouteAttribute::Table(t) => Some(*t),
            _ => None,
        })
        .unwrap_or_else(|| u32::from(msg.header.table))
}

fn inet(addr: &RouteAddress) -> Option<Ipv4Addr> {
    match addr {
        RouteAddress::Inet(ip) => Some(*ip),
        _ => None,
    }
}

fn gateway_of(attrs: &[RouteAttribute]) -> Option<Ipv4Addr> {
    attrs.iter().find_map(|attr| match attr {
        RouteAttribute::Gateway(addr) => inet(addr),
        _ => None,
    })
}

/// Output interfaces of a route, including every multipath hop.
fn route_oifs(msg: &RouteMessage) -> Vec<u32> {
    let mut oifs = Vec::new();
    for attr in &msg.attributes {
        match attr {
            RouteAttribute::Oif(index) => oifs.push(*index),
            RouteAttribute::MultiPath(hops) => oifs.extend(hops.iter().map(|hop| hop.interface_index)),
            _ => {}
        }
    }
    oifs
}

/// Convert a route message, naming its device from `names`.
///
/// Multipath routes report their first hop's gateway and device.
fn route_entry(msg: &RouteMessage, names: &HashMap<u32, String>) -> RouteEntry {
    let destination = msg
        .attributes
        .iter()
        .find_map(|attr| match attr {
            RouteAttribute::Destination(addr) => inet(addr),
            _ => None,
        })
        .map(|ip| Ipv4Cidr::new(ip, msg.header.destination_prefix_length))
        .filter(|cidr| cidr.prefix_len > 0);

    let first_hop = msg.attributes.iter().find_map(|attr| match attr {
        RouteAttribute::MultiPath(hops) => hops.first(),
        _ => None,
    });
    let gateway = gateway_of(&msg.attributes)
        .or_else(|| first_hop.and_then(|hop| gateway_of(&hop.attributes)));
    let device = route_oifs(msg)
        .first()
        .and_then(|index| names.get(index).cloned());

    RouteEntry {
        destination,
        gateway,
        device,
    }
}

fn routes_in_table(
    messages: &[RouteMessage],
    table: u32,
    names: &HashMap<u32, String>,
) -> Vec<RouteEntry> {
    messages
        .iter()
        .filter(|msg| route_table(msg) == table)
        .map(|msg| route_entry(msg, names))
        .collect()
}

/// Main-table routes leaving through interface `index`.
fn routes_via(
    messages: &[RouteMessage],
    index: u32,
    names: &HashMap<u32, String>,
) -> Vec<RouteEntry> {
    messages
        .iter()
        .filter(|msg| route_table(msg) == RT_TABLE_MAIN && route_oifs(msg).contains(&index))
        .map(|msg| route_entry(msg, names))
        .collect()
}

#[async_trait]
impl RouteSource for NetlinkRouteSource {
    async fn ipv4_addresses(&self, net_dev: &str) -> Result<Vec<Ipv4Cidr>, RoutingError> {
        let handle = self.connect()?;
        let index = self.link_index(&handle, net_dev).await?;
        let messages: Vec<AddressMessage> = self
            .bounded("address dump", handle.address().get().execute().try_collect())
            .await?;
        let addrs = interface_addresses(&messages, index);
        debug!(iface = %net_dev, index, count = addrs.len(), "read IPv4 addresses");
        Ok(addrs)
    }

    async fn policy_rules(&self) -> Result<Vec<PolicyRule>, RoutingError> {
        let handle = self.connect()?;
        let messages: Vec<RuleMessage> = self
            .bounded("rule dump", handle.rule().get(IpVersion::V4).execute().try_collect())
            .await?;
        trace!(count = messages.len(), "dumped policy rules");
        Ok(messages.iter().filter_map(policy_rule).collect())
    }

    async fn table_routes(&self, table: &str) -> Result<Vec<RouteEntry>, RoutingError> {
        let id = table_id(table)?;
        let handle = self.connect()?;
        let names = link_names(&self.links(&handle).await?);
        let messages = self.routes(&handle).await?;
        Ok(routes_in_table(&messages, id, &names))
    }

    async fn interface_routes(&self, net_dev: &str) -> Result<Vec<RouteEntry>, RoutingError> {
        let handle = self.connect()?;
        let names = link_names(&self.links(&handle).await?);
        let index = names
            .iter()
            .find_map(|(index, name)| (name == net_dev).then_some(*index))
            .ok_or_else(|| RoutingError::InterfaceNotFound(net_dev.to_string()))?;
        let messages = self.routes(&handle).await?;
        Ok(routes_via(&messages, index, &names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlink_packet_route::route::RouteNextHop;

    const ETH2: u32 = 6;

    fn v4(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn names() -> HashMap<u32, String> {
        HashMap::from([(1, "lo".to_string()), (ETH2, "eth2".to_string())])
    }

    fn address(index: u32, ip: &str, prefix_len: u8) -> AddressMessage {
        let mut msg = AddressMessage::default();
        msg.header.index = index;
        msg.header.prefix_len = prefix_len;
        msg.attributes.push(AddressAttribute::Address(IpAddr::V4(v4(ip))));
        msg.attributes.push(AddressAttribute::Local(IpAddr::V4(v4(ip))));
        msg
    }

    fn rule(priority: Option<u32>, source: Option<(&str, u8)>, table: u32) -> RuleMessage {
        let mut msg = RuleMessage::default();
        if let Some(p) = priority {
            msg.attributes.push(RuleAttribute::Priority(p));
        }
        if let Some((ip, len)) = source {
            msg.header.src_len = len;
            msg.attributes.push(RuleAttribute::Source(IpAddr::V4(v4(ip))));
        }
        msg.attributes.push(RuleAttribute::Table(table));
        msg
    }

    fn route(table: u32, dst: Option<(&str, u8)>, gateway: Option<&str>, oif: u32) -> RouteMessage {
        let mut msg = RouteMessage::default();
        msg.attributes.push(RouteAttribute::Table(table));
        if let Some((ip, len)) = dst {
            msg.header.destination_prefix_length = len;
            msg.attributes
                .push(RouteAttribute::Destination(RouteAddress::Inet(v4(ip))));
        }
        if let Some(gw) = gateway {
            msg.attributes
                .push(RouteAttribute::Gateway(RouteAddress::Inet(v4(gw))));
        }
        msg.attributes.push(RouteAttribute::Oif(oif));
        msg
    }

    #[test]
    fn test_table_names_round_trip_well_known_ids() {
        assert_eq!(table_name(254), "main");
        assert_eq!(table_name(255), "local");
        assert_eq!(table_name(253), "default");
        assert_eq!(table_name(100), "100");
        assert_eq!(table_id("main").unwrap(), 254);
        assert_eq!(table_id("100").unwrap(), 100);
        assert!(matches!(table_id("nope"), Err(RoutingError::Parse { .. })));
    }

    #[test]
    fn test_addresses_filtered_by_interface_in_order() {
        let messages = vec![
            address(1, "127.0.0.1", 8),
            address(ETH2, "10.1.0.9", 24),
            address(ETH2, "10.1.1.9", 24),
        ];
        assert_eq!(
            interface_addresses(&messages, ETH2),
            vec![
                "10.1.0.9/24".parse::<Ipv4Cidr>().unwrap(),
                "10.1.1.9/24".parse().unwrap(),
            ]
        );
        assert!(interface_addresses(&messages, 42).is_empty());
    }

    #[test]
    fn test_rules_convert_priority_source_and_table() {
        let local = policy_rule(&rule(None, None, 255)).unwrap();
        assert_eq!(local.priority, 0);
        assert_eq!(local.source, None);
        assert_eq!(local.table, "local");

        let subnet = policy_rule(&rule(Some(200), Some(("10.1.1.0", 24)), 200)).unwrap();
        assert_eq!(subnet.priority, 200);
        assert_eq!(subnet.source, Some("10.1.1.0/24".parse().unwrap()));
        assert_eq!(subnet.table, "200");
    }

    #[test]
    fn test_rules_without_table_are_skipped() {
        let mut goto = rule(Some(300), None, 0);
        goto.attributes.retain(|attr| !matches!(attr, RuleAttribute::Table(_)));
        assert_eq!(policy_rule(&goto), None);
    }

    #[test]
    fn test_table_routes_include_default_and_multipath() {
        let mut multipath = route(100, Some(("172.16.0.0", 16)), None, ETH2);
        multipath.attributes.retain(|attr| !matches!(attr, RouteAttribute::Oif(_)));
        let mut hop = RouteNextHop::default();
        hop.interface_index = ETH2;
        hop.attributes
            .push(RouteAttribute::Gateway(RouteAddress::Inet(v4("10.1.0.2"))));
        multipath.attributes.push(RouteAttribute::MultiPath(vec![hop]));

        let messages = vec![
            route(100, None, Some("10.1.0.1"), ETH2),
            route(100, Some(("10.1.0.0", 24)), None, ETH2),
            multipath,
            route(254, None, Some("192.168.0.1"), 1),
        ];

        let routes = routes_in_table(&messages, 100, &names());
        assert_eq!(routes.len(), 3);
        assert!(routes[0].is_default());
        assert_eq!(routes[0].gateway, Some(v4("10.1.0.1")));
        assert_eq!(routes[1].gateway, None);
        assert_eq!(routes[1].destination, Some("10.1.0.0/24".parse().unwrap()));
        assert_eq!(routes[2].gateway, Some(v4("10.1.0.2")));
        assert_eq!(routes[2].device.as_deref(), Some("eth2"));
    }

    #[test]
    fn test_interface_routes_come_from_main_table_only() {
        let messages = vec![
            route(254, None, Some("10.1.0.254"), ETH2),
            route(254, None, Some("192.168.0.1"), 1),
            route(100, None, Some("10.1.0.1"), ETH2),
        ];
        let routes = routes_via(&messages, ETH2, &names());
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].gateway, Some(v4("10.1.0.254")));
        assert_eq!(routes[0].device.as_deref(), Some("eth2"));
    }

    #[test]
    fn test_header_table_used_without_table_attribute() {
        let mut msg = route(254, None, Some("10.1.0.1"), ETH2);
        msg.attributes.retain(|attr| !matches!(attr, RouteAttribute::Table(_)));
        msg.header.table = 254;
        assert_eq!(route_table(&msg), RT_TABLE_MAIN);
    }
}
