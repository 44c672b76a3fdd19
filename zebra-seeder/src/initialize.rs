//! A function that starts every seeder task, and the handles that stop them.

use std::{net::SocketAddr, sync::Arc};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::Instrument;

use crate::{
    http, peer::PeerConnection, AddressBook, AddressBookUpdater, BoxError, Config, Crawler,
};

#[cfg(test)]
mod tests;

/// Handles for the tasks started by [`init`].
#[derive(Debug)]
pub struct SeederHandles {
    /// The shared address book.
    address_book: Arc<AddressBook>,

    /// Stops every seeder task.
    shutdown: CancellationToken,

    address_book_updater: JoinHandle<()>,

    crawler: JoinHandle<Result<(), BoxError>>,

    /// The good peer endpoint task, and its bound address.
    http: Option<(JoinHandle<()>, SocketAddr)>,
}

/// Starts the seeder for the network in `config`, probing peers with `connector`.
///
/// Spawns the address book updater task, adds the seed peers to the address
/// book, then spawns the crawler task, and the good peer endpoint task if it
/// is configured.
///
/// All the tasks stop when `shutdown` is cancelled, or when
/// [`SeederHandles::shutdown`] is called.
///
/// Returns an error if the peer cache directory can't be created, or the good
/// peer endpoint can't be opened.
pub async fn init<S, C>(
    config: Config,
    connector: S,
    shutdown: CancellationToken,
) -> Result<SeederHandles, BoxError>
where
    S: Service<SocketAddr, Response = C, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    C: PeerConnection,
{
    // Errors during startup only stop the tasks we've already started.
    let shutdown = shutdown.child_token();

    let (address_book, address_book_updater) =
        AddressBookUpdater::spawn(&config, shutdown.clone())?;

    let http = match config.http_listen_addr {
        Some(listen_addr) => match http::init(listen_addr, address_book.clone()).await {
            Ok(http) => Some(http),
            Err(error) => {
                // Flush the loaded address book before returning the error.
                shutdown.cancel();
                if let Err(join_error) = address_book_updater.await {
                    warn!(?join_error, "address book updater failed during startup");
                }

                return Err(error);
            }
        },
        None => None,
    };

    add_seed_peers(&config, &address_book, &shutdown).await;

    let crawler = Crawler::new(address_book.clone(), connector, &config);
    let crawler = tokio::spawn(
        crawler
            .run(shutdown.clone())
            .instrument(info_span!("crawler", network = %config.network)),
    );

    Ok(SeederHandles {
        address_book,
        shutdown,
        address_book_updater,
        crawler,
        http,
    })
}

/// Resolves the configured seed peers, and adds them to `address_book`.
///
/// Stops resolving seed peers if `shutdown` is cancelled.
async fn add_seed_peers(config: &Config, address_book: &AddressBook, shutdown: &CancellationToken) {
    let seed_peers = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return,
        seed_peers = config.initial_peers() => seed_peers,
    };

    let seed_addresses = seed_peers.len();
    let new_addresses = address_book.add_addresses(seed_peers, Utc::now());

    info!(
        seed_addresses,
        new_addresses,
        total_addresses = address_book.len(),
        "added seed peers to the address book"
    );
}

impl SeederHandles {
    /// Returns the shared address book.
    pub fn address_book(&self) -> Arc<AddressBook> {
        self.address_book.clone()
    }

    /// Returns the bound address of the good peer endpoint, if it is enabled.
    pub fn http_listen_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().map(|(_task, addr)| *addr)
    }

    /// Stops every seeder task, and waits for them to finish.
    ///
    /// The crawler disconnects from all its peers, and the address book is
    /// written to disk before this function returns.
    ///
    /// # Panics
    ///
    /// If the crawler or address book updater task panicked.
    pub async fn shutdown(self) -> Result<(), BoxError> {
        let SeederHandles {
            address_book: _,
            shutdown,
            address_book_updater,
            crawler,
            http,
        } = self;

        shutdown.cancel();

        // The endpoint only reads the address book, so it doesn't need a clean shutdown.
        if let Some((http_task, _addr)) = http {
            http_task.abort();
        }

        let crawler_result = crawler.await.unwrap_or_else(|join_error| {
            if join_error.is_panic() {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Err(join_error.into())
        });

        // Wait for the final snapshot, even if the crawler failed.
        if let Err(join_error) = address_book_updater.await {
            if join_error.is_panic() {
                std::panic::resume_unwind(join_error.into_panic())
            }
            return Err(join_error.into());
        }

        info!("seeder stopped");

        crawler_result
    }
}
