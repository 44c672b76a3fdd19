//! An address-with-metadata type used to track peer liveness and capabilities.

use std::{net::SocketAddr, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    constants::{PEER_EXPIRY_TIMEOUT, STALE_PEER_TIMEOUT},
    types::{IpVersion, PeerServices, Version},
};

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;


/// A peer address, with metadata about our interactions with that peer.
///
/// All timestamps start unset. Once set, they never go backwards.
///
/// `MetaAddr`s are owned by the [`AddressBook`](crate::AddressBook).
/// Other components only get copies.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MetaAddr {
    /// The peer's canonical address.
    pub(crate) addr: SocketAddr,

    /// The services reported by the peer in its most recent successful handshake.
    pub(crate) services: PeerServices,

    /// The protocol version reported by the peer in its most recent successful handshake.
    pub(crate) protocol_version: Version,

    /// The last time we started a probe of this peer.
    pub(crate) last_attempt: Option<DateTime<Utc>>,

    /// The first time a handshake with this peer succeeded.
    ///
    /// Once set, this time is never updated.
    pub(crate) first_success: Option<DateTime<Utc>>,

    /// The most recent time a handshake with this peer succeeded.
    pub(crate) last_success: Option<DateTime<Utc>>,

    /// The most recent time another peer sent us this address.
    pub(crate) last_seen: Option<DateTime<Utc>>,
}

/// A good peer, as returned to address book query endpoints.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GoodPeer {
    /// The peer's address and port, formatted as `ip:port` or `[ipv6]:port`.
    pub host: String,

    /// The services reported by the peer.
    pub services: u64,

    /// The protocol version reported by the peer.
    #[serde(rename = "pver")]
    pub protocol_version: u32,
}

impl MetaAddr {
    /// Returns a new `MetaAddr` for an address gossiped by a peer at `now`.
    ///
    /// Only `last_seen` is set.
    pub fn new_gossiped(addr: SocketAddr, now: DateTime<Utc>) -> MetaAddr {
        MetaAddr {
            addr,
            services: PeerServices::empty(),
            protocol_version: Version::default(),
            last_attempt: None,
            first_success: None,
            last_success: None,
            last_seen: Some(now),
        }
    }

    /// Returns the peer's canonical address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the services reported in the most recent successful handshake.
    pub fn services(&self) -> PeerServices {
        self.services
    }

    /// Returns the protocol version reported in the most recent successful handshake.
    pub fn protocol_version(&self) -> Version {
        self.protocol_version
    }

    /// Returns the last time we started a probe of this peer.
    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }

    /// Returns the first time a handshake with this peer succeeded.
    pub fn first_success(&self) -> Option<DateTime<Utc>> {
        self.first_success
    }

    /// Returns the most recent time a handshake with this peer succeeded.
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    /// Returns the most recent time another peer sent us this address.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Records that another peer sent us this address at `now`.
    pub(crate) fn update_seen(&mut self, now: DateTime<Utc>) {
        advance(&mut self.last_seen, now);
    }

    /// Records a probe attempt at `now`.
    pub(crate) fn update_attempt(&mut self, now: DateTime<Utc>) {
        advance(&mut self.last_attempt, now);
    }

    /// Records a successful handshake at `now`.
    pub(crate) fn update_success(
        &mut self,
        services: PeerServices,
        protocol_version: Version,
        now: DateTime<Utc>,
    ) {
        self.services = services;
        self.protocol_version = protocol_version;

        advance(&mut self.last_success, now);
        if self.first_success.is_none() {
            self.first_success = self.last_success;
        }
    }

    /// Returns `true` if this peer should be probed again.
    ///
    /// Peers are probed if they have never been attempted, or if their last
    /// success and last attempt are both older than [`STALE_PEER_TIMEOUT`].
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        !is_recent(self.last_success, now) && !is_recent(self.last_attempt, now)
    }

    /// Returns `true` if a handshake with this peer succeeded within the
    /// last [`STALE_PEER_TIMEOUT`].
    pub fn was_recently_live(&self, now: DateTime<Utc>) -> bool {
        is_recent(self.last_success, now)
    }

    /// Returns `true` if the first successful handshake with this peer was at
    /// least [`STALE_PEER_TIMEOUT`] ago.
    pub fn is_proven_stable(&self, now: DateTime<Utc>) -> bool {
        saturating_elapsed(self.first_success, now)
            .is_some_and(|first_success_age| first_success_age >= STALE_PEER_TIMEOUT)
    }

    /// Returns `true` if this peer can be advertised to query endpoints.
    pub fn is_good(&self, now: DateTime<Utc>) -> bool {
        self.is_proven_stable(now) && self.was_recently_live(now)
    }

    /// Returns `true` if this peer has been unseen or unreachable for longer
    /// than [`PEER_EXPIRY_TIMEOUT`], and should be pruned.
    ///
    /// Peers that have never been attempted are never expired. An unset
    /// `last_seen` or `last_success` is treated as infinitely old.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.last_attempt.is_none() {
            return false;
        }

        is_older_than(self.last_seen, now, PEER_EXPIRY_TIMEOUT)
            || is_older_than(self.last_success, now, PEER_EXPIRY_TIMEOUT)
    }

    /// Returns `true` if this peer matches all the filters in a good peer query.
    ///
    /// Does not check if the peer is good.
    pub fn matches(
        &self,
        ip_version: IpVersion,
        min_version: Version,
        required_services: PeerServices,
    ) -> bool {
        ip_version.matches(&self.addr.ip())
            && self.protocol_version >= min_version
            && self.services.satisfies(required_services)
    }

    /// Returns the query endpoint representation of this peer.
    pub fn good_peer(&self) -> GoodPeer {
        GoodPeer {
            host: self.addr.to_string(),
            services: self.services.bits(),
            protocol_version: self.protocol_version.0,
        }
    }
}

/// Sets `time` to `now`, unless it is already later than `now`.
fn advance(time: &mut Option<DateTime<Utc>>, now: DateTime<Utc>) {
    *time = Some(time.map_or(now, |time| time.max(now)));
}

/// Returns the amount of time since `time`, or `None` if `time` is unset.
///
/// Times after `now` have zero elapsed time.
fn saturating_elapsed(time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Duration> {
    time.map(|time| {
        now.signed_duration_since(time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    })
}

/// Returns `true` if `time` is set, and less than [`STALE_PEER_TIMEOUT`] before `now`.
fn is_recent(time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    saturating_elapsed(time, now).is_some_and(|age| age < STALE_PEER_TIMEOUT)
}

/// Returns `true` if `time` is unset, or more than `limit` before `now`.
fn is_older_than(time: Option<DateTime<Utc>>, now: DateTime<Utc>, limit: Duration) -> bool {
    saturating_elapsed(time, now).map_or(true, |age| age > limit)
}
