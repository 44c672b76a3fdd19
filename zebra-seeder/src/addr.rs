//! Peer address handling: canonicalization and routability.
//!
//! Every address is canonicalized before it is used as an address book key,
//! so the same peer never occupies two entries.

mod canonical;
mod routable;

#[cfg(test)]
mod tests;

pub use canonical::{canonical_ip_addr, canonical_socket_addr};
pub use routable::is_routable;
