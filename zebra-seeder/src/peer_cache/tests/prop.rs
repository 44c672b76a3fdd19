//! Randomised property tests for the peer cache.

use proptest::{collection::vec, prelude::*};

use crate::{meta_addr::MetaAddr, AddressBook};

use super::super::{load_peer_cache, write_peer_cache};

proptest! {
    // Each case writes a file, so use fewer cases than the default.
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Saving then loading an address book reproduces every entry,
    /// including entries with unset timestamps.
    #[test]
    fn peer_cache_round_trip(peers in vec(any::<MetaAddr>(), 0..20)) {
        zebra_seeder_test::init();

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nodes.json");

        let snapshot = AddressBook::new_with_addrs(peers).snapshot();
        write_peer_cache(&path, &snapshot)?;

        let restored = AddressBook::new_with_addrs(load_peer_cache(&path)?).snapshot();
        prop_assert_eq!(restored, snapshot);
    }
}
