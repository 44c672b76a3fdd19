//! The address book maintenance task, which prunes expired peers and
//! regularly writes the address book to disk.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    peer_cache::{load_or_reset, write_peer_cache},
    AddressBook, BoxError, Config,
};


/// The `AddressBookUpdater` owns the address book's on-disk state.
///
/// It loads the address book when the seeder starts, then keeps the peer
/// cache up to date until it is cancelled.
#[derive(Debug, Eq, PartialEq)]
pub struct AddressBookUpdater;

impl AddressBookUpdater {
    /// Spawn a new [`AddressBookUpdater`] task, maintaining an [`AddressBook`]
    /// loaded from the peer cache for the configured network.
    ///
    /// Returns handles for:
    /// - the address book, and
    /// - the maintenance task join handle.
    ///
    /// The task writes a final snapshot then exits when `shutdown` is cancelled.
    ///
    /// Returns an error if the peer cache directory can't be created.
    /// A corrupt peer cache is deleted, and the address book starts empty.
    pub fn spawn(
        config: &Config,
        shutdown: CancellationToken,
    ) -> Result<(Arc<AddressBook>, JoinHandle<()>), BoxError> {
        let peer_cache_dir = config.peer_cache_dir();
        std::fs::create_dir_all(&peer_cache_dir).map_err(|error| {
            error!(?error, ?peer_cache_dir, "could not create peer cache directory");
            error
        })?;

        let peers_file = config.peers_file();
        let address_book = Arc::new(AddressBook::new_with_addrs(load_or_reset(&peers_file)));

        let span = info_span!("address_book_updater", network = %config.network);
        let task = maintain_address_book(
            address_book.clone(),
            peers_file,
            config.prune_interval,
            config.dump_interval,
            shutdown,
        );
        let address_book_updater_task_handle = tokio::spawn(task.instrument(span));

        Ok((address_book, address_book_updater_task_handle))
    }
}

/// Prunes `address_book` every `prune_interval`, and writes it to `peers_file`
/// every `dump_interval`, until `shutdown` is cancelled.
///
/// Only one of these actions runs at a time.
async fn maintain_address_book(
    address_book: Arc<AddressBook>,
    peers_file: PathBuf,
    prune_interval: Duration,
    dump_interval: Duration,
    shutdown: CancellationToken,
) {
    info!(
        ?peers_file,
        initial_peers = address_book.len(),
        "starting the address book updater"
    );

    let mut prune_timer = interval_after(prune_interval);
    let mut dump_timer = interval_after(dump_interval);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            _ = prune_timer.tick() => prune(&address_book),

            _ = dump_timer.tick() => dump(&address_book, &peers_file).await,
        }
    }

    // Save all the peers we learned about before exiting.
    dump(&address_book, &peers_file).await;

    info!("stopped the address book updater");
}

/// Returns an interval that first ticks after `period`.
fn interval_after(period: Duration) -> time::Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    interval
}

/// Removes expired peers from `address_book`, and updates its metrics.
fn prune(address_book: &AddressBook) {
    let now = Utc::now();
    let pruned = address_book.prune(now);
    let address_metrics = address_book.address_metrics(now);

    metrics::counter!("seeder.addresses.pruned").increment(pruned as u64);
    metrics::gauge!("seeder.addresses.total").set(address_metrics.num_addresses as f64);
    metrics::gauge!("seeder.addresses.never_attempted")
        .set(address_metrics.never_attempted as f64);
    metrics::gauge!("seeder.addresses.stale").set(address_metrics.stale as f64);
    metrics::gauge!("seeder.addresses.good").set(address_metrics.good as f64);

    debug!(?address_metrics, "updated address book metrics");
}

/// Writes a snapshot of `address_book` to `peers_file`.
///
/// Errors are logged, and the next snapshot is written on the next cycle.
async fn dump(address_book: &AddressBook, peers_file: &Path) {
    // # Concurrency
    //
    // Copy the address book under its read lock, then release the lock
    // before encoding and writing the snapshot.
    let snapshot = address_book.snapshot();
    let peers_file = peers_file.to_owned();

    let write_result =
        tokio::task::spawn_blocking(move || write_peer_cache(&peers_file, &snapshot)).await;

    match write_result {
        Ok(Ok(saved_peers)) => {
            metrics::counter!("seeder.peer_cache.saved").increment(1);
            info!(saved_peers, "saved address book to the peer cache");
        }
        Ok(Err(error)) => {
            metrics::counter!("seeder.peer_cache.errors").increment(1);
            warn!(?error, "could not save address book to the peer cache");
        }
        Err(join_error) if join_error.is_panic() => {
            std::panic::resume_unwind(join_error.into_panic())
        }
        Err(join_error) => warn!(?join_error, "peer cache write task was cancelled"),
    }
}
