//! A mock connector and connection, for tests that don't use the network.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};

use futures::future::{self, BoxFuture, FutureExt};
use tower::Service;

use crate::{
    peer::{ConnectionInfo, PeerConnection},
    BoxError,
};

/// How a mock peer behaves when it is probed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MockPeer {
    /// Dialing fails immediately.
    Refuse,

    /// Dialing never completes.
    DialHang,

    /// The connection opens, but the handshake never completes.
    HandshakeHang,

    /// The handshake fails with an error.
    HandshakeError,

    /// The handshake completes, but the peer never sends addresses.
    AddrHang(ConnectionInfo),

    /// The handshake completes, and the peer responds with these addresses.
    Respond(ConnectionInfo, Vec<SocketAddr>),
}

/// A mock connector service, which returns [`MockConnection`]s.
///
/// Peers that don't have a configured behavior refuse connections.
#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    peers: Arc<HashMap<SocketAddr, MockPeer>>,
    dialed: Arc<Mutex<Vec<SocketAddr>>>,
    open_connections: Arc<AtomicUsize>,
}

impl MockConnector {
    /// Creates a new [`MockConnector`] with a behavior for each peer.
    pub fn new(peers: impl IntoIterator<Item = (SocketAddr, MockPeer)>) -> Self {
        MockConnector {
            peers: Arc::new(peers.into_iter().collect()),
            ..MockConnector::default()
        }
    }

    /// Returns every address this connector has dialed, in dial order.
    pub fn dialed(&self) -> Vec<SocketAddr> {
        self.dialed
            .lock()
            .expect("mock connector mutex should be unpoisoned")
            .clone()
    }

    /// Returns the number of connections that have been opened,
    /// but not disconnected.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }
}

impl Service<SocketAddr> for MockConnector {
    type Response = MockConnection;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, addr: SocketAddr) -> Self::Future {
        self.dialed
            .lock()
            .expect("mock connector mutex should be unpoisoned")
            .push(addr);

        let peer = self.peers.get(&addr).cloned().unwrap_or(MockPeer::Refuse);
        let open_connections = self.open_connections.clone();

        async move {
            match peer {
                MockPeer::Refuse => Err(BoxError::from("mock connection refused")),
                MockPeer::DialHang => future::pending().await,
                peer => {
                    open_connections.fetch_add(1, Ordering::SeqCst);
                    Ok(MockConnection {
                        peer,
                        open_connections: Some(open_connections),
                    })
                }
            }
        }
        .boxed()
    }
}

/// A mock connection to a [`MockPeer`].
#[derive(Debug)]
pub struct MockConnection {
    peer: MockPeer,

    /// The connector's open connection count, until this connection is disconnected.
    open_connections: Option<Arc<AtomicUsize>>,
}

impl PeerConnection for MockConnection {
    fn handshake_complete(&mut self) -> BoxFuture<'_, Result<ConnectionInfo, BoxError>> {
        match &self.peer {
            MockPeer::AddrHang(info) | MockPeer::Respond(info, _) => {
                future::ready(Ok(*info)).boxed()
            }
            MockPeer::HandshakeError => {
                future::ready(Err(BoxError::from("mock handshake failed"))).boxed()
            }
            _ => future::pending().boxed(),
        }
    }

    fn send_get_addr(&mut self) -> BoxFuture<'_, Result<(), BoxError>> {
        future::ready(Ok(())).boxed()
    }

    fn addr_received(&mut self) -> BoxFuture<'_, Result<Vec<SocketAddr>, BoxError>> {
        match &self.peer {
            MockPeer::Respond(_, addrs) => future::ready(Ok(addrs.clone())).boxed(),
            _ => future::pending().boxed(),
        }
    }

    fn disconnect(&mut self) {
        if let Some(open_connections) = self.open_connections.take() {
            open_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
