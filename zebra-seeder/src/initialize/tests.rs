//! Tests for starting and stopping the seeder.

use std::{collections::HashSet, net::SocketAddr, time::Duration};

use color_eyre::eyre::{eyre, Result};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use tokio_util::sync::CancellationToken;

use crate::{
    peer::{ConnectionInfo, MockConnector, MockPeer},
    peer_cache::load_peer_cache,
    types::{PeerServices, Version},
    Config, Network,
};

use super::init;

fn addr(addr: &str) -> SocketAddr {
    addr.parse().expect("test addresses are valid")
}

fn info() -> ConnectionInfo {
    ConnectionInfo {
        services: PeerServices::NODE_NETWORK,
        version: Version(170_100),
    }
}

/// Returns a config that uses `seed` as its only seed peer, stores its peer
/// cache in `cache_dir`, and serves good peers on a local port.
fn test_config(cache_dir: &tempfile::TempDir, seed: &str) -> Config {
    Config {
        network: Network::Mainnet,
        cache_dir: cache_dir.path().to_owned(),
        initial_mainnet_peers: HashSet::from([seed.to_string()]),
        http_listen_addr: Some(addr("127.0.0.1:0")),
        ..Config::default()
    }
}

/// The seeder crawls from its seed peer, serves queries, and saves the
/// address book when it is shut down.
#[tokio::test]
async fn seeder_crawls_and_saves_peers() -> Result<()> {
    zebra_seeder_test::init();

    let seed = addr("8.8.8.8:8233");
    let gossiped = addr("1.1.1.1:8233");

    let cache_dir = tempfile::tempdir()?;
    let config = test_config(&cache_dir, "8.8.8.8");
    let connector = MockConnector::new([
        (seed, MockPeer::Respond(info(), vec![gossiped])),
        (gossiped, MockPeer::Respond(info(), Vec::new())),
    ]);

    let seeder = init(config.clone(), connector.clone(), CancellationToken::new())
        .await
        .map_err(|e| eyre!(e))?;
    let address_book = seeder.address_book();

    // Wait for both peers to be probed
    let mut probed = false;
    for _ in 0..100 {
        probed = [seed, gossiped].iter().all(|addr| {
            address_book
                .get(*addr)
                .is_some_and(|meta_addr| meta_addr.last_attempt().is_some())
        });
        if probed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(probed, "seed and gossiped peers should be probed");

    // The peers aren't proven stable yet, so they aren't served.
    let http_addr = seeder
        .http_listen_addr()
        .ok_or_else(|| eyre!("good peer endpoint should be enabled"))?;
    let mut stream = tokio::net::TcpStream::connect(http_addr).await?;
    stream
        .write_all(b"GET /api/addrs HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.ends_with("\r\n\r\n"));

    seeder.shutdown().await.map_err(|e| eyre!(e))?;

    assert_eq!(connector.open_connections(), 0);

    let mut saved: Vec<SocketAddr> = load_peer_cache(&config.peers_file())?
        .into_iter()
        .map(|meta_addr| meta_addr.addr())
        .collect();
    saved.sort();
    assert_eq!(saved, vec![gossiped, seed]);

    Ok(())
}

/// Cancelling the caller's token stops the seeder tasks.
#[tokio::test]
async fn seeder_stops_on_cancel() -> Result<()> {
    zebra_seeder_test::init();

    let cache_dir = tempfile::tempdir()?;
    let config = Config {
        http_listen_addr: None,
        ..test_config(&cache_dir, "8.8.8.8")
    };

    let shutdown = CancellationToken::new();
    let seeder = init(config.clone(), MockConnector::default(), shutdown.clone())
        .await
        .map_err(|e| eyre!(e))?;
    assert_eq!(seeder.http_listen_addr(), None);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), seeder.shutdown())
        .await?
        .map_err(|e| eyre!(e))?;

    // The address book is saved on shutdown.
    assert!(config.peers_file().exists());

    Ok(())
}

/// Startup fails if the good peer endpoint can't be opened,
/// but the address book is still saved.
#[tokio::test]
async fn seeder_fails_if_endpoint_is_in_use() -> Result<()> {
    zebra_seeder_test::init();

    let in_use = TcpListener::bind("127.0.0.1:0").await?;
    let cache_dir = tempfile::tempdir()?;
    let config = Config {
        http_listen_addr: Some(in_use.local_addr()?),
        ..test_config(&cache_dir, "8.8.8.8")
    };

    let result = init(config.clone(), MockConnector::default(), CancellationToken::new()).await;

    assert!(result.is_err());
    assert!(config.peers_file().exists());

    Ok(())
}
