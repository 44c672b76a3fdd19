//! Configuration for the seeder.

use std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use futures::stream::{FuturesUnordered, StreamExt};

use crate::{
    addr::canonical_socket_addr,
    constants::{
        DEFAULT_ADDRESS_RETRY_INTERVAL, DEFAULT_DUMP_INTERVAL, DEFAULT_NODE_TIMEOUT,
        DEFAULT_PRUNE_INTERVAL, DNS_LOOKUP_TIMEOUT, MAX_SEED_PEER_DNS_RETRIES,
        PEER_CACHE_FILE_NAME, SEEDER_CACHE_DIR_NAME,
    },
    network::Network,
    BoxError,
};


/// Configuration for the seeder's crawler, address book, and query endpoint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The network to crawl.
    pub network: Network,

    /// The root directory for persisted state.
    ///
    /// The address book is stored in `seeder/<network>/nodes.json`
    /// inside this directory.
    pub cache_dir: PathBuf,

    /// Seed peers for mainnet.
    ///
    /// Each entry can be `address:port` or just `address`. If there is no
    /// port, the seeder uses the default port for the configured `network`.
    /// `address` can be an IP address or a DNS name. DNS names are only
    /// resolved once, when the seeder starts up.
    pub initial_mainnet_peers: HashSet<String>,

    /// Seed peers for testnet, in the same format as `initial_mainnet_peers`.
    pub initial_testnet_peers: HashSet<String>,

    /// The address of the good peer query endpoint.
    ///
    /// The endpoint is disabled if this is not set.
    pub http_listen_addr: Option<SocketAddr>,

    /// How often the address book removes expired peers.
    #[serde(with = "humantime_serde")]
    pub prune_interval: Duration,

    /// How often the address book is written to disk.
    #[serde(with = "humantime_serde")]
    pub dump_interval: Duration,

    /// The timeout for each stage of a peer probe.
    #[serde(with = "humantime_serde")]
    pub node_timeout: Duration,

    /// How long the crawler waits when there are no addresses to probe.
    #[serde(with = "humantime_serde")]
    pub address_retry_interval: Duration,
}

impl Default for Config {
    fn default() -> Config {
        let mainnet_peers = [
            "dnsseed.z.cash:8233",
            "dnsseed.str4d.xyz:8233",
            "mainnet.seeder.zfnd.org:8233",
            "mainnet.is.yolo.money:8233",
        ]
        .iter()
        .map(|&s| String::from(s))
        .collect();

        let testnet_peers = [
            "dnsseed.testnet.z.cash:18233",
            "testnet.seeder.zfnd.org:18233",
            "testnet.is.yolo.money:18233",
        ]
        .iter()
        .map(|&s| String::from(s))
        .collect();

        Config {
            network: Network::Mainnet,
            cache_dir: default_cache_dir(),
            initial_mainnet_peers: mainnet_peers,
            initial_testnet_peers: testnet_peers,
            http_listen_addr: None,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            dump_interval: DEFAULT_DUMP_INTERVAL,
            node_timeout: DEFAULT_NODE_TIMEOUT,
            address_retry_interval: DEFAULT_ADDRESS_RETRY_INTERVAL,
        }
    }
}

/// Returns the default cache directory, `<user cache dir>/zebra`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("cache"))
        .join("zebra")
}

impl Config {
    /// Returns the directory that contains the peer cache for the configured network.
    pub fn peer_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .join(SEEDER_CACHE_DIR_NAME)
            .join(self.network.lowercase_name())
    }

    /// Returns the peer cache file path for the configured network.
    pub fn peers_file(&self) -> PathBuf {
        self.peer_cache_dir().join(PEER_CACHE_FILE_NAME)
    }

    /// Returns the configured seed peers for the configured network.
    pub fn seed_peers(&self) -> &HashSet<String> {
        match self.network {
            Network::Mainnet => &self.initial_mainnet_peers,
            Network::Testnet => &self.initial_testnet_peers,
        }
    }

    /// Resolves the seed peers for the configured network.
    ///
    /// Seed peers without a port get the network's default port.
    /// Returns an empty set if every seed peer fails DNS resolution.
    pub async fn initial_peers(&self) -> HashSet<SocketAddr> {
        let peers = self.seed_peers();

        if peers.is_empty() {
            warn!(
                "no initial peers in the seeder config. \
                 Hint: you must configure at least one peer IP or DNS seeder \
                 for the crawler to discover the network"
            );
            return HashSet::new();
        }

        let default_port = self.network.default_port();
        let peer_addresses: HashSet<SocketAddr> = peers
            .iter()
            .map(|host| with_default_port(host, default_port))
            .map(|host| async move { resolve_host(&host, MAX_SEED_PEER_DNS_RETRIES).await })
            .collect::<FuturesUnordered<_>>()
            .concat()
            .await;

        if peer_addresses.is_empty() {
            warn!(?peers, "empty seed peer list after DNS resolution");
        } else {
            info!(
                seed_hosts = peers.len(),
                seed_addresses = peer_addresses.len(),
                "resolved seed peers"
            );
        }

        peer_addresses
    }
}

/// Returns `host` with `default_port` appended, if it does not already have a port.
fn with_default_port(host: &str, default_port: u16) -> String {
    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }

    // Bare IPv6 addresses contain colons, so check for IP addresses first.
    if let Ok(ip) = host.parse::<IpAddr>() {
        return SocketAddr::new(ip, default_port).to_string();
    }

    let has_port = host
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok());

    if has_port {
        host.to_string()
    } else {
        format!("{host}:{default_port}")
    }
}

/// Resolves `host` into zero or more IP addresses, retrying up to
/// `max_retries` times.
///
/// If DNS continues to fail, returns an empty list of addresses.
/// Waits [`DNS_LOOKUP_TIMEOUT`] between attempts, but not after the last one.
async fn resolve_host(host: &str, max_retries: usize) -> HashSet<SocketAddr> {
    for retry_count in 1..=max_retries {
        match resolve_host_once(host).await {
            Ok(addresses) => return addresses,
            Err(_) if retry_count < max_retries => {
                info!(?host, ?retry_count, "retrying seed peer DNS resolution")
            }
            Err(_) => warn!(?host, ?retry_count, "giving up on seed peer DNS resolution"),
        };

        if retry_count < max_retries {
            tokio::time::sleep(DNS_LOOKUP_TIMEOUT).await;
        }
    }

    HashSet::new()
}

/// Resolves `host` into zero or more IP addresses.
///
/// If `host` is a DNS name, performs DNS resolution with a timeout of a few seconds.
/// If DNS resolution fails or times out, returns an error.
async fn resolve_host_once(host: &str) -> Result<HashSet<SocketAddr>, BoxError> {
    let fut = tokio::net::lookup_host(host);
    let fut = tokio::time::timeout(DNS_LOOKUP_TIMEOUT, fut);

    match fut.await {
        Ok(Ok(ips)) => Ok(ips.map(canonical_socket_addr).collect()),
        Ok(Err(e)) => {
            info!(?host, ?e, "DNS error resolving seed peer IP address");
            Err(e.into())
        }
        Err(e) => {
            info!(?host, ?e, "DNS timeout resolving seed peer IP address");
            Err(e.into())
        }
    }
}
