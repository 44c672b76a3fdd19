//! The crawler, which probes stale peers to discover new addresses,
//! and to check that known peers are still reachable.
//!
//! The crawler repeatedly takes a batch of stale addresses from the address
//! book, probes each address in its own task, and waits for the whole batch
//! before starting the next one.

use std::{fmt, future::Future, net::SocketAddr, sync::Arc, time::Duration};

use chrono::Utc;
use futures::{stream::FuturesUnordered, FutureExt, StreamExt};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::Instrument;

use crate::{
    peer::{ConnectionInfo, PeerConnection},
    types::{PeerServices, Version},
    AddressBook, BoxError, Config,
};


/// Repeatedly probes batches of stale addresses from an [`AddressBook`],
/// using a connector service.
pub struct Crawler<S> {
    address_book: Arc<AddressBook>,
    connector: S,
    node_timeout: Duration,
    address_retry_interval: Duration,
}

impl<S> fmt::Debug for Crawler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crawler")
            .field("address_book_len", &self.address_book.len())
            .field("node_timeout", &self.node_timeout)
            .field("address_retry_interval", &self.address_retry_interval)
            .finish()
    }
}

impl<S, C> Crawler<S>
where
    S: Service<SocketAddr, Response = C, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    C: PeerConnection,
{
    /// Creates a new crawler that probes peers from `address_book` using
    /// `connector`, with the timeouts in `config`.
    pub fn new(address_book: Arc<AddressBook>, connector: S, config: &Config) -> Self {
        Crawler {
            address_book,
            connector,
            node_timeout: config.node_timeout,
            address_retry_interval: config.address_retry_interval,
        }
    }

    /// Crawls the network until `shutdown` is cancelled.
    ///
    /// Individual probe failures are recorded in the address book,
    /// and never returned as errors.
    ///
    /// # Panics
    ///
    /// If a probe task panics.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), BoxError> {
        info!("starting the crawler");

        while !shutdown.is_cancelled() {
            let candidates = self.address_book.addresses(Utc::now());

            if candidates.is_empty() {
                debug!(
                    retry_interval = ?self.address_retry_interval,
                    "no stale addresses, waiting before checking again"
                );

                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = sleep(self.address_retry_interval) => continue,
                }
            }

            let context = self.probe_context(&shutdown);
            crawl_batch(context, candidates).await;
        }

        info!("stopped the crawler");

        Ok(())
    }

    /// Returns the context shared by every probe in a batch.
    fn probe_context(&self, shutdown: &CancellationToken) -> ProbeContext<S> {
        ProbeContext {
            address_book: self.address_book.clone(),
            connector: self.connector.clone(),
            node_timeout: self.node_timeout,
            shutdown: shutdown.clone(),
        }
    }
}

/// Probes every address in `candidates` concurrently, then waits for all the
/// probes to finish.
async fn crawl_batch<S, C>(context: ProbeContext<S>, candidates: Vec<SocketAddr>) -> BatchSummary
where
    S: Service<SocketAddr, Response = C, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    C: PeerConnection,
{
    let batch_size = candidates.len();
    debug!(batch_size, "starting probe batch");

    // Spawn each probe into an independent task, so slow peers don't delay
    // other probes in the batch.
    let mut probes: FuturesUnordered<_> = candidates
        .into_iter()
        .map(|addr| {
            let probe = test_peer(context.clone(), addr)
                .instrument(debug_span!("probe", peer = %addr));

            tokio::spawn(probe).map(move |res| match res {
                Ok(probe_result) => probe_result,
                Err(e) => panic!("panic while probing {addr:?}: {e:?}"),
            })
        })
        .collect();

    let mut summary = BatchSummary::default();

    metrics::gauge!("seeder.crawler.in_flight_probes").set(probes.len() as f64);

    while let Some(probe_result) = probes.next().await {
        metrics::gauge!("seeder.crawler.in_flight_probes").set(probes.len() as f64);
        metrics::counter!(
            "seeder.crawler.probes",
            "outcome" => probe_result.outcome.as_str()
        )
        .increment(1);

        summary.add(&probe_result);
    }

    info!(batch_size, ?summary, "finished probe batch");

    summary
}

/// The aggregate results of a probe batch, for logging.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct BatchSummary {
    completed: usize,
    failed: usize,
    timed_out: usize,
    cancelled: usize,
    new_addresses: usize,
}

impl BatchSummary {
    fn add(&mut self, probe_result: &ProbeResult) {
        match probe_result.outcome {
            ProbeOutcome::Completed { new_addresses, .. } => {
                self.completed += 1;
                self.new_addresses += new_addresses;
            }
            ProbeOutcome::Failed(_) => self.failed += 1,
            ProbeOutcome::TimedOut => self.timed_out += 1,
            ProbeOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Everything a single probe needs.
///
/// Each probe gets its own copy, so probes don't share any mutable state
/// apart from the address book.
#[derive(Clone)]
pub struct ProbeContext<S> {
    /// The address book that receives the probe results.
    pub address_book: Arc<AddressBook>,

    /// The service used to dial the peer.
    pub connector: S,

    /// The timeout for each stage of the probe.
    pub node_timeout: Duration,

    /// Cancels the probe, and disconnects from the peer.
    pub shutdown: CancellationToken,
}

impl<S> fmt::Debug for ProbeContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeContext")
            .field("node_timeout", &self.node_timeout)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

/// The stages of a probe.
///
/// Every probe starts at `Idle`, and moves forward one stage at a time.
/// A timeout, error, or cancellation ends the probe at its current stage.
/// Once a probe has finished, the peer is disconnected, and the stage it
/// reached is reported in [`ProbeResult::last_state`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum ProbeState {
    /// The probe hasn't started.
    #[default]
    Idle,

    /// Waiting for the connector to open a connection.
    Dialing,

    /// Waiting for the version handshake.
    Handshaking,

    /// Waiting for the peer's address list.
    AwaitingAddresses,
}

/// How a probe ended.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The handshake and address exchange both succeeded.
    Completed {
        /// The services reported by the peer.
        services: PeerServices,

        /// The protocol version reported by the peer.
        version: Version,

        /// The number of new addresses the peer sent us.
        new_addresses: usize,
    },

    /// The connector or connection returned an error.
    Failed(BoxError),

    /// A stage took longer than the node timeout.
    TimedOut,

    /// The crawler was shut down during the probe.
    Cancelled,
}

impl ProbeOutcome {
    /// Returns a short name for this outcome, for metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Completed { .. } => "completed",
            ProbeOutcome::Failed(_) => "failed",
            ProbeOutcome::TimedOut => "timed_out",
            ProbeOutcome::Cancelled => "cancelled",
        }
    }
}

/// The result of probing a single peer.
#[derive(Debug)]
pub struct ProbeResult {
    /// The probed address.
    pub addr: SocketAddr,

    /// The last stage the probe reached before it finished.
    ///
    /// Completed probes stop at [`ProbeState::AwaitingAddresses`].
    pub last_state: ProbeState,

    /// How the probe ended.
    pub outcome: ProbeOutcome,
}

/// Probes the peer at `addr`: dials it, waits for its handshake, then asks it
/// for more addresses. Records the results in the address book.
///
/// Always records an attempt for `addr` after the probe finishes, and always
/// disconnects from the peer if the connection was opened.
pub async fn test_peer<S, C>(context: ProbeContext<S>, addr: SocketAddr) -> ProbeResult
where
    S: Service<SocketAddr, Response = C, Error = BoxError> + Send + 'static,
    S::Future: Send + 'static,
    C: PeerConnection,
{
    let ProbeContext {
        address_book,
        connector,
        node_timeout,
        shutdown,
    } = context;
    let stage = Stage {
        node_timeout,
        shutdown: &shutdown,
    };

    let mut last_state = ProbeState::Idle;
    let outcome = probe(&address_book, connector, &stage, addr, &mut last_state).await;

    // Record the attempt after the probe, so the staleness clock advances
    // even if the peer failed.
    address_book.attempt(addr, Utc::now());

    match &outcome {
        ProbeOutcome::Completed { new_addresses, .. } => {
            debug!(new_addresses, "probe completed")
        }
        outcome => debug!(?last_state, ?outcome, "probe did not complete"),
    }

    ProbeResult {
        addr,
        last_state,
        outcome,
    }
}

/// Runs each stage of a probe of `addr`, updating `state` as it goes.
async fn probe<S, C>(
    address_book: &AddressBook,
    connector: S,
    stage: &Stage<'_>,
    addr: SocketAddr,
    state: &mut ProbeState,
) -> ProbeOutcome
where
    S: Service<SocketAddr, Response = C, Error = BoxError>,
    C: PeerConnection,
{
    *state = ProbeState::Dialing;
    let mut connection = match stage.run(connector.oneshot(addr)).await {
        Ok(Ok(connection)) => connection,
        Ok(Err(error)) => return ProbeOutcome::Failed(error),
        Err(outcome) => return outcome,
    };

    let outcome = exchange(address_book, &mut connection, stage, addr, state).await;

    connection.disconnect();

    outcome
}

/// Runs the handshake and address stages on an open `connection`.
async fn exchange<C: PeerConnection>(
    address_book: &AddressBook,
    connection: &mut C,
    stage: &Stage<'_>,
    addr: SocketAddr,
    state: &mut ProbeState,
) -> ProbeOutcome {
    *state = ProbeState::Handshaking;
    let ConnectionInfo { services, version } =
        match stage.run(connection.handshake_complete()).await {
            Ok(Ok(info)) => info,
            Ok(Err(error)) => return ProbeOutcome::Failed(error),
            Err(outcome) => return outcome,
        };

    address_book.good(addr, services, version, Utc::now());

    *state = ProbeState::AwaitingAddresses;
    let addrs = match stage.run(request_addresses(connection)).await {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(error)) => return ProbeOutcome::Failed(error),
        Err(outcome) => return outcome,
    };

    let received_addresses = addrs.len();
    let new_addresses = address_book.add_addresses(addrs, Utc::now());
    trace!(received_addresses, new_addresses, "received peer addresses");

    ProbeOutcome::Completed {
        services,
        version,
        new_addresses,
    }
}

/// Asks the peer on `connection` for addresses, and waits for its response.
async fn request_addresses<C: PeerConnection>(
    connection: &mut C,
) -> Result<Vec<SocketAddr>, BoxError> {
    connection.send_get_addr().await?;
    connection.addr_received().await
}

/// The timeout and cancellation limits for each probe stage.
struct Stage<'a> {
    node_timeout: Duration,
    shutdown: &'a CancellationToken,
}

impl Stage<'_> {
    /// Runs `stage_future` until it finishes, the node timeout elapses,
    /// or the probe is cancelled.
    ///
    /// Returns the stage's output, or the probe outcome if it didn't finish.
    async fn run<F: Future>(&self, stage_future: F) -> Result<F::Output, ProbeOutcome> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ProbeOutcome::Cancelled),
            output = timeout(self.node_timeout, stage_future) => {
                output.map_err(|_elapsed| ProbeOutcome::TimedOut)
            }
        }
    }
}
