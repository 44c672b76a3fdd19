//! Randomised test data generation for [`MetaAddr`].

use std::net::SocketAddr;

use chrono::{DateTime, TimeZone, Utc};
use proptest::{arbitrary::any, arbitrary::Arbitrary, option, prelude::*};

use crate::{
    addr::canonical_socket_addr,
    types::{PeerServices, Version},
};

use super::MetaAddr;

/// Returns a strategy for optional timestamps with a whole number of seconds.
fn datetime_option() -> impl Strategy<Value = Option<DateTime<Utc>>> {
    option::of(any::<u32>().prop_map(|seconds| {
        Utc.timestamp_opt(seconds.into(), 0)
            .single()
            .expect("all u32 values are valid timestamps")
    }))
}

impl Arbitrary for MetaAddr {
    type Parameters = ();

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        (
            any::<SocketAddr>(),
            any::<u64>(),
            any::<u32>(),
            datetime_option(),
            datetime_option(),
            datetime_option(),
            datetime_option(),
        )
            .prop_map(
                |(addr, services, version, last_attempt, first_success, last_success, last_seen)| {
                    MetaAddr {
                        addr: canonical_socket_addr(addr),
                        services: PeerServices::from_bits_retain(services),
                        protocol_version: Version(version),
                        last_attempt,
                        // The first success can't be later than the last success.
                        first_success: last_success.map(|last_success| {
                            first_success.map_or(last_success, |first| first.min(last_success))
                        }),
                        last_success,
                        last_seen,
                    }
                },
            )
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
