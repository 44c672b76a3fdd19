//! The `AddressBook` manages information about what peers exist, when they were
//! seen, and what services they provide.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};
use rand::seq::IteratorRandom;

use crate::{
    addr::{canonical_socket_addr, is_routable},
    constants::MAX_ADDRS_PER_QUERY,
    meta_addr::{GoodPeer, MetaAddr},
    types::{IpVersion, PeerServices, Version},
};


/// A database of peer addresses, with liveness and capability metadata
/// from the crawler.
///
/// All mutating methods take the registry write lock, all queries take the
/// read lock. Queries always see a consistent snapshot of the registry.
///
/// Time-dependent methods take the current time as an argument.
/// Production code should pass `Utc::now()`.
#[derive(Debug, Default)]
pub struct AddressBook {
    /// Each known peer address has a matching `MetaAddr`,
    /// keyed by its canonical address.
    by_addr: RwLock<HashMap<SocketAddr, MetaAddr>>,
}

/// The filters used by a good peer query.
///
/// The default filter matches every good peer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct GoodAddressFilter {
    /// The required IP address family.
    pub ip_version: IpVersion,

    /// The minimum protocol version, `Version(0)` matches any version.
    pub min_version: Version,

    /// Services the peer must provide, an empty set matches any services.
    pub required_services: PeerServices,
}

/// Statistics about the state of the address book.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct AddressMetrics {
    /// The number of addresses in the address book.
    pub num_addresses: usize,

    /// The number of addresses that have never been probed.
    pub never_attempted: usize,

    /// The number of addresses that are due for another probe.
    pub stale: usize,

    /// The number of good addresses, which can be returned by queries.
    pub good: usize,
}

impl AddressBook {
    /// Construct an empty [`AddressBook`].
    pub fn new() -> AddressBook {
        AddressBook::default()
    }

    /// Construct an [`AddressBook`] containing `addrs`.
    ///
    /// Addresses are canonicalized, but routability is not checked,
    /// so that peer cache entries are restored unchanged.
    /// If there are multiple entries for the same address, the last one wins.
    pub fn new_with_addrs(addrs: impl IntoIterator<Item = MetaAddr>) -> AddressBook {
        let by_addr = addrs
            .into_iter()
            .map(|mut meta_addr| {
                meta_addr.addr = canonical_socket_addr(meta_addr.addr);
                (meta_addr.addr, meta_addr)
            })
            .collect();

        AddressBook {
            by_addr: RwLock::new(by_addr),
        }
    }

    /// Adds gossiped `addrs` to the address book, returning the number of new
    /// addresses.
    ///
    /// Non-routable addresses are ignored. Addresses that are already in the
    /// address book have their last seen time updated to `now`, but are not
    /// counted.
    pub fn add_addresses(
        &self,
        addrs: impl IntoIterator<Item = SocketAddr>,
        now: DateTime<Utc>,
    ) -> usize {
        use std::collections::hash_map::Entry;

        let mut new_addrs = 0;
        let mut by_addr = self.write();

        for addr in addrs {
            let addr = canonical_socket_addr(addr);
            if !is_routable(addr.ip()) {
                continue;
            }

            match by_addr.entry(addr) {
                Entry::Occupied(mut entry) => entry.get_mut().update_seen(now),
                Entry::Vacant(entry) => {
                    entry.insert(MetaAddr::new_gossiped(addr, now));
                    new_addrs += 1;
                }
            }
        }

        trace!(
            new_addrs,
            total_addrs = by_addr.len(),
            "added gossiped addresses"
        );

        new_addrs
    }

    /// Returns up to [`MAX_ADDRS_PER_QUERY`] addresses that are due for a probe.
    ///
    /// The returned addresses are a random sample of the stale addresses.
    /// See [`MetaAddr::is_stale`] for details.
    pub fn addresses(&self, now: DateTime<Utc>) -> Vec<SocketAddr> {
        self.read()
            .values()
            .filter(|meta_addr| meta_addr.is_stale(now))
            .map(MetaAddr::addr)
            .choose_multiple(&mut rand::thread_rng(), MAX_ADDRS_PER_QUERY)
    }

    /// Records a probe attempt of `addr` at `now`.
    ///
    /// Does nothing if `addr` is not in the address book,
    /// for example, if it was pruned while it was being probed.
    pub fn attempt(&self, addr: SocketAddr, now: DateTime<Utc>) {
        let addr = canonical_socket_addr(addr);

        if let Some(meta_addr) = self.write().get_mut(&addr) {
            meta_addr.update_attempt(now);
        }
    }

    /// Records a successful handshake with `addr` at `now`, and the `services`
    /// and `protocol_version` the peer reported.
    ///
    /// Does nothing if `addr` is not in the address book.
    pub fn good(
        &self,
        addr: SocketAddr,
        services: PeerServices,
        protocol_version: Version,
        now: DateTime<Utc>,
    ) {
        let addr = canonical_socket_addr(addr);

        if let Some(meta_addr) = self.write().get_mut(&addr) {
            meta_addr.update_success(services, protocol_version, now);
        }
    }

    /// Returns up to [`MAX_ADDRS_PER_QUERY`] good peers that match `filter`.
    ///
    /// Good peers have been reachable for at least one staleness window, and
    /// were reachable within the last staleness window.
    /// See [`MetaAddr::is_good`] for details.
    ///
    /// The returned peers are a random sample of the matching peers.
    pub fn good_addresses(&self, filter: GoodAddressFilter, now: DateTime<Utc>) -> Vec<GoodPeer> {
        let GoodAddressFilter {
            ip_version,
            min_version,
            required_services,
        } = filter;

        self.read()
            .values()
            .filter(|meta_addr| meta_addr.is_good(now))
            .filter(|meta_addr| meta_addr.matches(ip_version, min_version, required_services))
            .map(MetaAddr::good_peer)
            .choose_multiple(&mut rand::thread_rng(), MAX_ADDRS_PER_QUERY)
    }

    /// Removes tested peers that have been unseen or unreachable for too long,
    /// returning the number of removed peers.
    ///
    /// See [`MetaAddr::is_expired`] for details.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut by_addr = self.write();

        let initial_len = by_addr.len();
        by_addr.retain(|_addr, meta_addr| !meta_addr.is_expired(now));
        let pruned = initial_len - by_addr.len();

        info!(pruned, remaining = by_addr.len(), "pruned address book");

        pruned
    }

    /// Returns a copy of every entry in the address book.
    ///
    /// The copy is taken under a single read lock, so it is consistent.
    pub fn snapshot(&self) -> HashMap<SocketAddr, MetaAddr> {
        self.read().clone()
    }

    /// Returns the entry for `addr`, if it is in the address book.
    pub fn get(&self, addr: SocketAddr) -> Option<MetaAddr> {
        self.read().get(&canonical_socket_addr(addr)).copied()
    }

    /// Returns statistics about the current state of the address book.
    pub fn address_metrics(&self, now: DateTime<Utc>) -> AddressMetrics {
        let by_addr = self.read();

        let mut metrics = AddressMetrics {
            num_addresses: by_addr.len(),
            ..AddressMetrics::default()
        };

        for meta_addr in by_addr.values() {
            if meta_addr.last_attempt().is_none() {
                metrics.never_attempted += 1;
            }
            if meta_addr.is_stale(now) {
                metrics.stale += 1;
            }
            if meta_addr.is_good(now) {
                metrics.good += 1;
            }
        }

        metrics
    }

    /// Returns the number of entries in the address book.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if the address book has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // # Concurrency
    //
    // The lock guards must be dropped before any `.await`,
    // so callers should hold them for as short a time as possible.

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SocketAddr, MetaAddr>> {
        self.by_addr
            .read()
            .expect("unexpected panic while holding the address book lock")
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SocketAddr, MetaAddr>> {
        self.by_addr
            .write()
            .expect("unexpected panic while holding the address book lock")
    }
}
