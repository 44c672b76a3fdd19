//! A network crawler and address reputation store for Zcash seeders.
//!
//! The seeder discovers peer addresses by repeatedly asking known peers for
//! more addresses. It checks that each peer is reachable using the version
//! handshake, and keeps a persistent, regularly pruned catalogue of good peers
//! that can be served to new nodes.
//!
//! ## `zebra-seeder` Structure
//!
//! [`init`] is the main entry point for `zebra-seeder`.
//! It spawns the following tasks:
//!
//! Address Book Updater Task:
//!  * loads the [`AddressBook`] from the peer cache on disk
//!  * regularly prunes peers that have been unreachable or unseen for too long
//!  * regularly writes the address book to the peer cache
//!  * writes the address book one last time on shutdown
//!
//! Initial Seed Peer Task:
//! On startup:
//!  * loads seed peers from the config, resolving them via DNS if required
//!  * adds routable seed peer addresses to the [`AddressBook`]
//!
//! [`Crawler`] Task:
//!  * takes batches of stale addresses from the [`AddressBook`]
//!  * probes every address in a batch concurrently, waiting for the whole
//!    batch to finish before starting the next one
//!  * records each peer's handshake results and gossiped addresses
//!
//! Good Peer Endpoint Task (optional):
//!  * serves good peers from the [`AddressBook`] over HTTP
//!
//! ### Peer Protocol
//!
//! This crate does not implement the Zcash wire protocol. [`init`] callers
//! supply a connector [`tower::Service`] that returns
//! [`PeerConnection`]s, see the [`peer`] module for details.

#![doc(html_favicon_url = "https://zfnd.org/wp-content/uploads/2022/03/zebra-favicon-128.png")]
#![doc(html_logo_url = "https://zfnd.org/wp-content/uploads/2022/03/zebra-icon.png")]
#![doc(html_root_url = "https://docs.rs/zebra_seeder")]

#[macro_use]
extern crate serde;
#[macro_use]
extern crate tracing;
#[macro_use]
extern crate bitflags;

/// Type alias to make working with tower traits easier.
///
/// Note: the 'static lifetime bound means that the *type* cannot have any
/// non-'static lifetimes, (e.g., when a type contains a borrow and is
/// parameterized by 'a), *not* that the object itself has 'static lifetime.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub mod addr;
pub mod config;
pub mod constants;
pub mod crawler;
pub mod http;
pub mod peer;
pub mod peer_cache;

mod address_book;
mod address_book_updater;
mod initialize;
mod meta_addr;
mod network;
mod types;

pub use crate::{
    address_book::{AddressBook, AddressMetrics, GoodAddressFilter},
    address_book_updater::AddressBookUpdater,
    config::Config,
    crawler::Crawler,
    initialize::{init, SeederHandles},
    meta_addr::{GoodPeer, MetaAddr},
    network::Network,
    peer::{ConnectionInfo, PeerConnection},
    types::{IpVersion, PeerServices, Version},
};
