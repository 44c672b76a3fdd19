//! The seeder's canonical node address format.
//!
//! The seeder canonicalises all received addresses into Rust [`SocketAddr`]s.
//! If the address is an [IPv4-mapped IPv6 address], it becomes a [`SocketAddr::V4`]
//!
//! [IPv4-mapped IPv6 address]: https://en.wikipedia.org/wiki/IPv6#IPv4-mapped_IPv6_addresses

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// Transform an IPv6 address into a canonical IP address.
///
/// Peers gossip IPv4-mapped IPv6 addresses in their `addr` messages.
/// The seeder converts those addresses to `Ipv4Addr`s, so that each peer has
/// a single address book entry.
pub fn canonical_ip_addr(v6_addr: &Ipv6Addr) -> IpAddr {
    use IpAddr::*;

    match v6_addr.to_ipv4_mapped() {
        Some(v4_addr) => V4(v4_addr),
        None => V6(*v6_addr),
    }
}

/// Transform a `SocketAddr` into a canonical `SocketAddr`, converting
/// IPv4-mapped IPv6 addresses, and removing IPv6 scope IDs and flow information.
///
/// See [`canonical_ip_addr`] for detailed info on IPv4-mapped IPv6 addresses.
pub fn canonical_socket_addr(socket_addr: impl Into<SocketAddr>) -> SocketAddr {
    use SocketAddr::*;

    let mut socket_addr = socket_addr.into();
    if let V6(v6_socket_addr) = socket_addr {
        let canonical_ip = canonical_ip_addr(v6_socket_addr.ip());
        // creating a new SocketAddr removes scope IDs and flow information
        socket_addr = SocketAddr::new(canonical_ip, socket_addr.port());
    }

    socket_addr
}
