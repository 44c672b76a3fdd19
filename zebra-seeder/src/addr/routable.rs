//! Filtering of addresses that are not globally reachable.
//!
//! Peers gossip every address they know, including addresses that only make
//! sense on their local network. Those addresses are dropped when they are
//! added to the address book, and never checked again.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::canonical_ip_addr;

/// The IPv4 shared address space used by carrier-grade NAT, as defined by
/// [RFC 6598](https://datatracker.ietf.org/doc/html/rfc6598) (100.64.0.0/10).
const RFC6598_NET: (Ipv4Addr, u8) = (Ipv4Addr::new(100, 64, 0, 0), 10);

/// IPv6 address blocks that are not globally routable.
const NON_ROUTABLE_V6_NETS: [(Ipv6Addr, u8); 5] = [
    // IPv6 to IPv4 encapsulation, RFC 3964 (2002::/16).
    (Ipv6Addr::new(0x2002, 0, 0, 0, 0, 0, 0, 0), 16),
    // Teredo tunneling over UDP, RFC 4380 (2001::/32).
    (Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, 0), 32),
    // ORCHID, RFC 4843 (2001:10::/28).
    (Ipv6Addr::new(0x2001, 0x10, 0, 0, 0, 0, 0, 0), 28),
    // Stateless address autoconfiguration, RFC 4862 (fe80::/64).
    (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 64),
    // Unique local addresses, RFC 4193 (fc00::/7).
    (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
];

/// Returns `true` if `ip` is globally reachable, and worth storing in the
/// address book.
///
/// Rejects loopback, unspecified and private addresses, carrier-grade NAT
/// addresses, and the non-routable IPv6 special-use blocks.
/// IPv4-mapped IPv6 addresses are checked as IPv4 addresses.
pub fn is_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4_addr) => ipv4_is_routable(&v4_addr),
        IpAddr::V6(v6_addr) => match canonical_ip_addr(&v6_addr) {
            IpAddr::V4(v4_addr) => ipv4_is_routable(&v4_addr),
            IpAddr::V6(v6_addr) => ipv6_is_routable(&v6_addr),
        },
    }
}

fn ipv4_is_routable(addr: &Ipv4Addr) -> bool {
    let (rfc6598_net, rfc6598_prefix) = RFC6598_NET;

    !addr.is_loopback()
        && !addr.is_unspecified()
        && !addr.is_private()
        && !in_v4_net(addr, &rfc6598_net, rfc6598_prefix)
}

fn ipv6_is_routable(addr: &Ipv6Addr) -> bool {
    !addr.is_loopback()
        && !addr.is_unspecified()
        && !NON_ROUTABLE_V6_NETS
            .iter()
            .any(|(net, prefix_len)| in_v6_net(addr, net, *prefix_len))
}

/// Returns `true` if the first `prefix_len` bits of `addr` and `net` are equal.
fn in_v4_net(addr: &Ipv4Addr, net: &Ipv4Addr, prefix_len: u8) -> bool {
    let mask = u32::MAX
        .checked_shl(32 - u32::from(prefix_len))
        .unwrap_or(0);

    u32::from(*addr) & mask == u32::from(*net) & mask
}

/// Returns `true` if the first `prefix_len` bits of `addr` and `net` are equal.
fn in_v6_net(addr: &Ipv6Addr, net: &Ipv6Addr, prefix_len: u8) -> bool {
    let mask = u128::MAX
        .checked_shl(128 - u32::from(prefix_len))
        .unwrap_or(0);

    u128::from(*addr) & mask == u128::from(*net) & mask
}
