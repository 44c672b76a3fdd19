//! Definitions of constants.

use std::time::Duration;

/// The maximum number of addresses returned by a single address book query.
///
/// Limits both the crawler's probe batch size, and the number of good peers
/// returned to query endpoints.
pub const MAX_ADDRS_PER_QUERY: usize = 16;

/// The amount of time after which a success or attempt is no longer recent.
///
/// Peers are re-probed once both their last success and last attempt are
/// older than this interval.
///
/// This is also the minimum amount of time a peer must have been reachable
/// before it is advertised as a good peer.
pub const STALE_PEER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// The amount of time a tested peer can go unseen or unreachable before it is
/// removed from the address book.
pub const PEER_EXPIRY_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);

/// The default interval between address book prune passes.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// The default interval between address book snapshots to disk.
pub const DEFAULT_DUMP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// The default timeout for each stage of a peer probe:
/// dialing, the version handshake, and the `addr` response.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(3);

/// The default amount of time the crawler waits when no addresses need probing.
pub const DEFAULT_ADDRESS_RETRY_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// The timeout for DNS lookups of seed peers.
///
/// [6.1.3.3 Efficient Resource Usage] from [RFC 1123: Requirements for Internet Hosts]
/// suggest no less than 5 seconds for resolving timeout.
///
/// [RFC 1123: Requirements for Internet Hosts] https://tools.ietf.org/rfcmarkup?doc=1123
/// [6.1.3.3  Efficient Resource Usage] https://tools.ietf.org/rfcmarkup?doc=1123#page-77
pub const DNS_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// The number of times the seeder retries DNS resolution of each seed host.
pub const MAX_SEED_PEER_DNS_RETRIES: usize = 2;

/// The name of the peer cache file, inside the per-network cache directory.
pub const PEER_CACHE_FILE_NAME: &str = "nodes.json";

/// The name of the seeder's subdirectory in the configured cache directory.
pub const SEEDER_CACHE_DIR_NAME: &str = "seeder";

/// The HTTP path that serves good peer addresses.
pub const GET_ADDRS_PATH: &str = "/api/addrs";

/// The `User-Agent`-style server name reported by the HTTP endpoint.
pub const HTTP_SERVER_NAME: &str = "zebra-seeder";
