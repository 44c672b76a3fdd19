//! An HTTP endpoint that serves good peer addresses from the address book.
//!
//! `GET /api/addrs` returns up to 16 good peers, one JSON object per line:
//!
//! ```text
//! {"host":"203.0.113.6:8233","services":1,"pver":170100}
//! ```
//!
//! Optional query parameters filter the results:
//! - `ipversion`: `4` or `6` to only return peers from that address family,
//! - `pver`: the minimum protocol version,
//! - `services`: a bitmask of services that every peer must provide.
//!
//! Missing, invalid, or zero parameters don't filter the results.
//!
//! The endpoint is disabled by default. Enable it by setting
//! `http_listen_addr` in the seeder config. It only reads the address book.

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::{
    body::Incoming,
    header::{CONTENT_LENGTH, CONTENT_TYPE, SERVER},
    http::response::Builder as ResponseBuilder,
    server::conn::http1,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::{
    net::TcpListener,
    task::JoinHandle,
    time::{timeout, Instant},
};

use crate::{
    constants::{GET_ADDRS_PATH, HTTP_SERVER_NAME},
    types::{IpVersion, PeerServices, Version},
    AddressBook, BoxError, GoodAddressFilter,
};

#[cfg(test)]
mod tests;

const METHOD_NOT_ALLOWED_MSG: &str = "method not allowed";
const NOT_FOUND_MSG: &str = "not found";

/// The maximum amount of time a client can take to send a request and read its response.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The maximum number of requests that will be handled in a given time interval before requests are dropped.
const MAX_RECENT_REQUESTS: usize = 10_000;
const RECENT_REQUEST_INTERVAL: Duration = Duration::from_secs(5);

/// Opens the good peer endpoint on `listen_addr`, and spawns its server task.
///
/// Returns the server task handle, and the bound socket address.
///
/// Returns an error if `listen_addr` can't be bound.
pub async fn init(
    listen_addr: SocketAddr,
    address_book: Arc<AddressBook>,
) -> Result<(JoinHandle<()>, SocketAddr), BoxError> {
    info!("opening good peer endpoint at {listen_addr}...");

    let listener = TcpListener::bind(listen_addr).await.map_err(|error| {
        error!(
            ?error,
            "opening good peer endpoint listener {listen_addr:?} failed. \
             Hint: check if another seeder is running, or change the http_listen_addr in the config"
        );
        error
    })?;

    let local = listener.local_addr().unwrap_or_else(|error| {
        warn!(?error, "failed to read local addr from TcpListener");
        listen_addr
    });

    info!("opened good peer endpoint at {local}");

    let task = tokio::spawn(run_server(listener, address_book));

    Ok((task, local))
}

/// Counts recent requests, so bursts of connections can be dropped.
#[derive(Debug)]
struct RecentRequests {
    count: usize,
    reset_time: Instant,
}

impl RecentRequests {
    fn new(now: Instant) -> Self {
        RecentRequests {
            count: 0,
            reset_time: now,
        }
    }

    /// Returns `true` if a request at `now` should be served, and counts it.
    ///
    /// Once [`MAX_RECENT_REQUESTS`] have been served, requests are dropped
    /// until [`RECENT_REQUEST_INTERVAL`] has passed since the last reset.
    fn allow(&mut self, now: Instant) -> bool {
        if self.count < MAX_RECENT_REQUESTS {
            self.count += 1;
            true
        } else if now.saturating_duration_since(self.reset_time) > RECENT_REQUEST_INTERVAL {
            // The request that resets the counter is the first one in the new interval.
            self.count = 1;
            self.reset_time = now;
            true
        } else {
            false
        }
    }
}

async fn run_server(listener: TcpListener, address_book: Arc<AddressBook>) {
    let mut recent_requests = RecentRequests::new(Instant::now());

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                if !recent_requests.allow(Instant::now()) {
                    // Drop the request if there have been too many recent requests
                    continue;
                }

                let io = TokioIo::new(stream);
                let address_book = address_book.clone();
                let service = hyper::service::service_fn(move |req| {
                    handle_request(req, address_book.clone())
                });

                tokio::spawn(async move {
                    let connection = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .header_read_timeout(HTTP_TIMEOUT)
                        .serve_connection(io, service);

                    match timeout(HTTP_TIMEOUT, connection).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => debug!(?err, "good peer connection closed with error"),
                        Err(_) => debug!("good peer connection timed out"),
                    }
                });
            }
            Err(err) => {
                warn!(?err, "good peer endpoint accept failed");
            }
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    address_book: Arc<AddressBook>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::GET {
        return Ok(simple_response(
            StatusCode::METHOD_NOT_ALLOWED,
            METHOD_NOT_ALLOWED_MSG.to_string(),
        ));
    }

    if req.uri().path() != GET_ADDRS_PATH {
        return Ok(simple_response(
            StatusCode::NOT_FOUND,
            NOT_FOUND_MSG.to_string(),
        ));
    }

    let filter = parse_filter(req.uri().query().unwrap_or_default());
    let peers = address_book.good_addresses(filter, Utc::now());

    // This is not a JSON array, each line is a separate JSON object.
    let mut body = String::new();
    for peer in &peers {
        match serde_json::to_string(peer) {
            Ok(line) => {
                body.push_str(&line);
                body.push('\n');
            }
            Err(error) => warn!(?error, ?peer, "failed to encode good peer"),
        }
    }

    metrics::counter!("seeder.http.requests").increment(1);
    debug!(?filter, peers = peers.len(), "served good peers");

    Ok(simple_response(StatusCode::OK, body))
}

/// Parses the good peer filters from a URL query string.
///
/// Unknown parameters and invalid values are ignored.
fn parse_filter(query: &str) -> GoodAddressFilter {
    let mut filter = GoodAddressFilter::default();

    for (key, value) in query.split('&').filter_map(|pair| pair.split_once('=')) {
        match key {
            "ipversion" => {
                filter.ip_version = value
                    .parse()
                    .map(IpVersion::from_query)
                    .unwrap_or_default()
            }
            "pver" => filter.min_version = value.parse().map(Version).unwrap_or_default(),
            "services" => {
                filter.required_services = value
                    .parse()
                    .map(PeerServices::from_bits_retain)
                    .unwrap_or_default()
            }
            _ => {}
        }
    }

    filter
}

fn simple_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let bytes = Bytes::from(body);
    let len = bytes.len();
    ResponseBuilder::new()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CONTENT_LENGTH, len.to_string())
        .header(SERVER, HTTP_SERVER_NAME)
        .body(Full::new(bytes))
        .expect("valid response")
}
