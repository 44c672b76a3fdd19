//! The capabilities the crawler needs from a peer protocol implementation.
//!
//! The seeder doesn't implement the peer wire protocol. Instead, callers
//! supply a connector [`tower::Service`] that dials a peer address, and returns
//! a [`PeerConnection`] that performs the version handshake and the `getaddr`
//! exchange.
//!
//! Connectors must implement:
//! `Service<SocketAddr, Response = impl PeerConnection, Error = BoxError>`.

use std::net::SocketAddr;

use futures::future::BoxFuture;

use crate::{
    types::{PeerServices, Version},
    BoxError,
};

#[cfg(any(test, feature = "proptest-impl"))]
pub mod mock;

#[cfg(any(test, feature = "proptest-impl"))]
pub use mock::{MockConnection, MockConnector, MockPeer};

/// The capabilities a peer reported in its version handshake.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ConnectionInfo {
    /// The services advertised by the peer.
    pub services: PeerServices,

    /// The protocol version advertised by the peer.
    pub version: Version,
}

/// An open connection to a peer, as returned by a connector service.
///
/// The crawler wraps every call in its own timeout and cancellation checks,
/// so implementations don't need to time out. Implementations should return
/// an error if the connection fails, or the peer sends an invalid message.
pub trait PeerConnection: Send + 'static {
    /// Waits for the version handshake to complete, and returns the
    /// peer's reported capabilities.
    fn handshake_complete(&mut self) -> BoxFuture<'_, Result<ConnectionInfo, BoxError>>;

    /// Asks the peer for its known addresses.
    fn send_get_addr(&mut self) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Waits for the peer's address list.
    ///
    /// The list can be empty.
    fn addr_received(&mut self) -> BoxFuture<'_, Result<Vec<SocketAddr>, BoxError>>;

    /// Closes the connection.
    ///
    /// The crawler calls this exactly once at the end of every probe,
    /// including failed, timed out, and cancelled probes.
    fn disconnect(&mut self);
}
