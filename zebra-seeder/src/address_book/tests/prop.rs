//! Randomised property tests for the address book.

use std::{collections::HashSet, net::SocketAddr, time::Duration};

use proptest::{collection::vec, prelude::*};

use crate::{
    addr::{canonical_socket_addr, is_routable},
    constants::{MAX_ADDRS_PER_QUERY, STALE_PEER_TIMEOUT},
    types::{IpVersion, PeerServices, Version},
    AddressBook, GoodAddressFilter,
};

use super::{after, start_time};

/// The maximum number of addresses in each generated batch.
const MAX_ADDR_CHANGES: usize = 40;

proptest! {
    /// Only routable addresses are added, each canonical address is added once,
    /// and adding the same batch again adds nothing.
    #[test]
    fn add_addresses_counts_new_routable_addresses(
        addrs in vec(any::<SocketAddr>(), 0..MAX_ADDR_CHANGES),
    ) {
        zebra_seeder_test::init();

        let address_book = AddressBook::new();
        let expected: HashSet<SocketAddr> = addrs
            .iter()
            .map(|addr| canonical_socket_addr(*addr))
            .filter(|addr| is_routable(addr.ip()))
            .collect();

        let added = address_book.add_addresses(addrs.clone(), start_time());
        prop_assert_eq!(added, expected.len());
        prop_assert_eq!(address_book.len(), expected.len());

        let added_again = address_book.add_addresses(addrs, start_time());
        prop_assert_eq!(added_again, 0, "re-adding the same addresses must not add entries");
        prop_assert_eq!(address_book.len(), expected.len());

        for addr in address_book.snapshot().keys() {
            prop_assert!(expected.contains(addr), "unexpected address {} in address book", addr);
        }
    }

    /// Probe candidates are limited, unique, and only contain stale addresses.
    #[test]
    fn addresses_are_limited_and_stale(
        addrs in vec(any::<SocketAddr>(), 0..MAX_ADDR_CHANGES),
        attempted in vec(any::<bool>(), MAX_ADDR_CHANGES),
    ) {
        zebra_seeder_test::init();

        let now = start_time();
        let address_book = AddressBook::new();
        address_book.add_addresses(addrs.clone(), now);

        for (addr, attempted) in addrs.iter().zip(attempted) {
            if attempted {
                address_book.attempt(*addr, now);
            }
        }

        let candidates = address_book.addresses(now);
        let unique: HashSet<SocketAddr> = candidates.iter().copied().collect();

        prop_assert!(candidates.len() <= MAX_ADDRS_PER_QUERY);
        prop_assert_eq!(unique.len(), candidates.len(), "candidates must be unique");

        let snapshot = address_book.snapshot();
        for addr in &candidates {
            let meta_addr = snapshot.get(addr);
            prop_assert!(
                meta_addr.is_some_and(|meta_addr| meta_addr.is_stale(now)),
                "{} must be a stale address in the address book",
                addr,
            );
        }

        let stale = snapshot.values().filter(|meta_addr| meta_addr.is_stale(now)).count();
        prop_assert_eq!(candidates.len(), stale.min(MAX_ADDRS_PER_QUERY));
    }

    /// Good peers that advertise a superset of the required services are
    /// returned, and peers that are missing any required service are not.
    #[test]
    fn good_addresses_require_all_services(
        services in any::<u64>(),
        required_services in any::<u64>(),
        protocol_version in any::<u32>(),
    ) {
        zebra_seeder_test::init();

        let now = start_time();
        let later = after(now, STALE_PEER_TIMEOUT);
        let addr: SocketAddr = "8.8.8.8:8233".parse().unwrap();

        let address_book = AddressBook::new();
        address_book.add_addresses([addr], now);
        for time in [now, later] {
            address_book.good(
                addr,
                PeerServices::from_bits_retain(services),
                Version(protocol_version),
                time,
            );
        }

        let filter = GoodAddressFilter {
            ip_version: IpVersion::Any,
            min_version: Version(0),
            required_services: PeerServices::from_bits_retain(required_services),
        };
        let good = address_book.good_addresses(filter, later);

        let is_superset = services & required_services == required_services;
        prop_assert_eq!(good.len(), usize::from(is_superset));

        if let Some(peer) = good.first() {
            prop_assert_eq!(peer.services, services);
            prop_assert_eq!(peer.protocol_version, protocol_version);
        }
    }

    /// Peers only become good after a full staleness window of successes.
    #[test]
    fn good_addresses_require_proven_stability(
        elapsed_secs in 0..(2 * STALE_PEER_TIMEOUT.as_secs()),
    ) {
        zebra_seeder_test::init();

        let now = start_time();
        let later = after(now, Duration::from_secs(elapsed_secs));
        let addr: SocketAddr = "8.8.8.8:8233".parse().unwrap();

        let address_book = AddressBook::new();
        address_book.add_addresses([addr], now);
        address_book.good(addr, PeerServices::NODE_NETWORK, Version(7), now);
        address_book.good(addr, PeerServices::NODE_NETWORK, Version(7), later);

        let good = address_book.good_addresses(GoodAddressFilter::default(), later);
        let expected = Duration::from_secs(elapsed_secs) >= STALE_PEER_TIMEOUT;

        prop_assert_eq!(!good.is_empty(), expected);
    }
}
