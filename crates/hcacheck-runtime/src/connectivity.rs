//! Gateway reachability through `ping`, falling back to TCP connects.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hcacheck_core::ports::{
    CommandRequest, CommandRunner, ProbeMethod, Reachability, ReachabilityProbe,
};
use hcacheck_core::{CacheError, TtlCache};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// TCP ports tried, in order, when ICMP gets no answer.
pub const DEFAULT_TCP_PORTS: [u16; 3] = [443, 80, 22];

const PING_WAIT_SECS: &str = "2";
const PING_TIMEOUT: Duration = Duration::from_secs(5);
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Failure of the probe cache. Probe failures themselves are results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type ConnectivityCache = TtlCache<String, Reachability, ProbeError>;

#[derive(Clone)]
struct Probes {
    runner: Arc<dyn CommandRunner>,
    tcp_ports: Vec<u16>,
    tcp_timeout: Duration,
}

impl Probes {
    async fn run(self, net_dev: String, gateway: Ipv4Addr) -> Reachability {
        let mut failures = Vec::new();

        let request = CommandRequest::new(
            "ping",
            [
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                PING_WAIT_SECS.to_string(),
                "-I".to_string(),
                net_dev.clone(),
                gateway.to_string(),
            ],
        )
        .with_timeout(PING_TIMEOUT);
        match self.runner.stdout(request).await {
            Ok(_) => return Reachability::reachable(ProbeMethod::Icmp),
            Err(e) => {
                debug!(iface = %net_dev, %gateway, error = %e, "ping failed, trying TCP");
                failures.push("icmp: no reply".to_string());
            }
        }

        for port in self.tcp_ports {
            let addr = SocketAddr::V4(SocketAddrV4::new(gateway, port));
            match tokio::time::timeout(self.tcp_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => return Reachability::reachable(ProbeMethod::Tcp(port)),
                Ok(Err(e)) => failures.push(format!("tcp/{port}: {e}")),
                Err(_) => failures.push(format!("tcp/{port}: timed out")),
            }
        }

        warn!(iface = %net_dev, %gateway, "gateway unreachable");
        Reachability::unreachable(failures.join(", "))
    }
}

/// [`ReachabilityProbe`] with a per `<netdev>:<gateway>` result cache.
pub struct ConnectivityProber {
    probes: Probes,
    cache: Arc<ConnectivityCache>,
}

impl ConnectivityProber {
    pub fn new(runner: Arc<dyn CommandRunner>, cache: Arc<ConnectivityCache>) -> Self {
        Self {
            probes: Probes {
                runner,
                tcp_ports: DEFAULT_TCP_PORTS.to_vec(),
                tcp_timeout: TCP_CONNECT_TIMEOUT,
            },
            cache,
        }
    }

    pub fn with_ttl(runner: Arc<dyn CommandRunner>, ttl: Duration) -> Self {
        Self::new(runner, Arc::new(ConnectivityCache::new("connectivity", ttl)))
    }

    #[must_use]
    pub fn with_tcp_ports(mut self, ports: impl Into<Vec<u16>>) -> Self {
        self.probes.tcp_ports = ports.into();
        self
    }

    pub fn cache(&self) -> &Arc<ConnectivityCache> {
        &self.cache
    }

    pub async fn close(&self) {
        self.cache.close().await;
    }
}

#[async_trait]
impl ReachabilityProbe for ConnectivityProber {
    async fn probe(&self, net_dev: &str, gateway: Ipv4Addr) -> Reachability {
        let probes = self.probes.clone();
        let net_dev = net_dev.to_string();
        let key = format!("{net_dev}:{gateway}");
        self.cache
            .get_or_refresh(key, move || async move { Ok(probes.run(net_dev, gateway).await) })
            .await
            .unwrap_or_else(|e| Reachability::unreachable(e.to_string()))
    }
}
