//! Peer capability types reported during the version handshake.

use std::{fmt, net::IpAddr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// A bitflag describing services advertised by a node in the network.
    ///
    /// Unknown bits are retained, so that peers advertising new services can
    /// still be matched by the raw bitmask in queries.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct PeerServices: u64 {
        /// NODE_NETWORK means that the node is a full node capable of serving
        /// blocks, as opposed to a light client that makes network requests but
        /// does not provide network services.
        const NODE_NETWORK = 1;
    }
}

impl PeerServices {
    /// Returns `true` if these services include every service in `required`.
    ///
    /// An empty `required` set matches every peer.
    pub fn satisfies(&self, required: PeerServices) -> bool {
        self.contains(required)
    }
}

// The services bitmask is stored as its raw integer value,
// so that unknown service bits round-trip through the peer cache.
impl Serialize for PeerServices {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for PeerServices {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(PeerServices::from_bits_retain(u64::deserialize(deserializer)?))
    }
}

/// A protocol version number.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(pub u32);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The IP address family filter used by good peer queries.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum IpVersion {
    /// Match IPv4 and IPv6 peers.
    #[default]
    Any,

    /// Only match IPv4 peers.
    V4,

    /// Only match IPv6 peers.
    V6,
}

impl IpVersion {
    /// Converts a query's numeric IP version into a filter.
    ///
    /// `4` and `6` select a single address family, any other value matches
    /// both families.
    pub fn from_query(ip_version: u32) -> Self {
        match ip_version {
            4 => IpVersion::V4,
            6 => IpVersion::V6,
            _ => IpVersion::Any,
        }
    }

    /// Returns `true` if `ip` is in this address family.
    ///
    /// Expects a canonical IP address, so IPv4-mapped IPv6 addresses have
    /// already been converted to IPv4.
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            IpVersion::Any => true,
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
        }
    }
}
