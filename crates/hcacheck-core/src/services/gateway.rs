//! Policy-aware egress gateway resolution.
//!
//! Mirrors the subset of kernel route selection needed to find the gateway
//! an RDMA net device egresses through:
//!
//! 1. IPv4 source addresses of the device, in listing order.
//! 2. Policy rules by ascending priority; a rule applies when its source
//!    selector is absent, equals the address, or contains it.
//! 3. In each applicable rule's table, a default route with a gateway wins;
//!    otherwise the first route with any gateway is a fallback candidate.
//! 4. The first default-route gateway across all (source, rule) pairs is
//!    returned, else the first fallback candidate.
//! 5. Without a policy match, the device's own routes are searched the
//!    same way.
//! 6. A device with a global IPv6 address and no usable IPv4 gateway (no
//!    IPv4 address, or nothing found above) resolves to the IPv6 sentinel.
//!
//! Policy results are cached per net device for the configured TTL,
//! including failures.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, TtlCache};
use crate::domain::{GatewayResolution, LinkLayer, NoGatewayReason};
use crate::ports::{LinkInspector, RouteEntry, RouteSource, RoutingError};

/// Errors from gateway resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("Interface {net_dev} has no IPv4 address")]
    NoIpv4Address { net_dev: String },

    #[error("No gateway found for interface {net_dev}")]
    NotFound { net_dev: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Cache type shared by resolvers. Keyed by net device name.
pub type GatewayCache = TtlCache<String, GatewayResolution, GatewayError>;

/// How a gateway was picked from one route list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pick {
    Default(Ipv4Addr),
    Fallback(Ipv4Addr),
}

/// Default route first, then the first route carrying any gateway.
fn pick_gateway(routes: &[RouteEntry]) -> Option<Pick> {
    let mut fallback = None;
    for route in routes {
        match (route.is_default(), route.gateway) {
            (true, Some(gw)) => return Some(Pick::Default(gw)),
            (false, Some(gw)) if fallback.is_none() => fallback = Some(Pick::Fallback(gw)),
            _ => {}
        }
    }
    fallback
}

/// Find the gateway for `net_dev` from live routing data. Uncached.
pub async fn find_gateway(
    routes: &dyn RouteSource,
    links: &dyn LinkInspector,
    net_dev: &str,
) -> Result<GatewayResolution, GatewayError> {
    let addresses = routes.ipv4_addresses(net_dev).await?;
    if addresses.is_empty() {
        if links.has_global_ipv6(net_dev)? {
            info!(net_dev, "interface has only IPv6 addresses, skipping gateway lookup");
            return Ok(GatewayResolution::Ipv6Only);
        }
        return Err(GatewayError::NoIpv4Address {
            net_dev: net_dev.to_string(),
        });
    }

    let mut rules = routes.policy_rules().await?;
    rules.sort_by_key(|r| r.priority);

    let mut tables: HashMap<String, Vec<RouteEntry>> = HashMap::new();
    let mut fallback: Option<Ipv4Addr> = None;

    for source in &addresses {
        for rule in rules.iter().filter(|r| r.matches_source(source.addr)) {
            if !tables.contains_key(&rule.table) {
                match routes.table_routes(&rule.table).await {
                    Ok(list) => {
                        tables.insert(rule.table.clone(), list);
                    }
                    Err(e) => {
                        warn!(table = %rule.table, error = %e, "failed to list policy table");
                        continue;
                    }
                }
            }
            let Some(list) = tables.get(&rule.table) else {
                continue;
            };
            match pick_gateway(list) {
                Some(Pick::Default(gw)) => {
                    info!(
                        net_dev,
                        source = %source.addr,
                        table = %rule.table,
                        priority = rule.priority,
                        gateway = %gw,
                        "found default gateway via policy routing"
                    );
                    return Ok(GatewayResolution::Resolved(gw));
                }
                Some(Pick::Fallback(gw)) => {
                    debug!(net_dev, table = %rule.table, gateway = %gw, "fallback gateway candidate");
                    fallback.get_or_insert(gw);
                }
                None => debug!(net_dev, table = %rule.table, "no gateway in policy table"),
            }
        }
    }

    if let Some(gw) = fallback {
        info!(net_dev, gateway = %gw, "using fallback gateway from policy routing");
        return Ok(GatewayResolution::Resolved(gw));
    }

    debug!(net_dev, "policy routing found nothing, falling back to interface routes");
    let iface_routes = routes.interface_routes(net_dev).await?;
    match pick_gateway(&iface_routes) {
        Some(Pick::Default(gw) | Pick::Fallback(gw)) => {
            info!(net_dev, gateway = %gw, "found gateway via interface routing");
            Ok(GatewayResolution::Resolved(gw))
        }
        None if links.has_global_ipv6(net_dev)? => {
            info!(net_dev, "no IPv4 gateway but interface has IPv6, skipping gateway lookup");
            Ok(GatewayResolution::Ipv6Only)
        }
        None => Err(GatewayError::NotFound {
            net_dev: net_dev.to_string(),
        }),
    }
}

/// Resolves adapter gateways with link-layer short cuts and a TTL cache.
#[derive(Clone)]
pub struct GatewayResolver {
    links: Arc<dyn LinkInspector>,
    routes: Arc<dyn RouteSource>,
    cache: Arc<GatewayCache>,
}

impl GatewayResolver {
    /// Create a resolver over an explicitly constructed cache.
    pub fn new(
        links: Arc<dyn LinkInspector>,
        routes: Arc<dyn RouteSource>,
        cache: Arc<GatewayCache>,
    ) -> Self {
        Self {
            links,
            routes,
            cache,
        }
    }

    /// Create a resolver with its own cache.
    pub fn with_ttl(
        links: Arc<dyn LinkInspector>,
        routes: Arc<dyn RouteSource>,
        ttl: Duration,
    ) -> Self {
        Self::new(links, routes, Arc::new(GatewayCache::new("gateway", ttl)))
    }

    pub fn cache(&self) -> &Arc<GatewayCache> {
        &self.cache
    }

    /// Resolve the egress gateway of `net_dev`.
    pub async fn resolve(&self, net_dev: &str) -> Result<GatewayResolution, GatewayError> {
        match self.links.link_layer(net_dev)? {
            LinkLayer::InfiniBand => {
                debug!(net_dev, "no gateway for InfiniBand link layer");
                return Ok(GatewayResolution::NoGateway(
                    NoGatewayReason::InfiniBandLinkLayer,
                ));
            }
            LinkLayer::Unknown => {
                warn!(net_dev, "unsupported link layer, skipping gateway lookup");
                return Ok(GatewayResolution::NoGateway(
                    NoGatewayReason::UnknownLinkLayer,
                ));
            }
            LinkLayer::Ethernet => {}
        }

        if !self.links.is_up(net_dev)? {
            warn!(net_dev, "interface is down, cannot find gateway");
            return Ok(GatewayResolution::NoGateway(NoGatewayReason::InterfaceDown));
        }

        let routes = Arc::clone(&self.routes);
        let links = Arc::clone(&self.links);
        let key = net_dev.to_string();
        self.cache
            .get_or_refresh(key.clone(), move || async move {
                find_gateway(routes.as_ref(), links.as_ref(), &key).await
            })
            .await
    }

    /// Drop cached lookups and stop caching.
    pub async fn close(&self) {
        self.cache.close().await;
    }
}
