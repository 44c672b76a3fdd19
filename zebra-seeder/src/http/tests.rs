use super::*;

use std::net::{IpAddr, Ipv4Addr};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::meta_addr::GoodPeer;

// Adds good peers to a new address book. The peers were first reached two
// hours ago, so they are already proven stable.
fn address_book_with_good_peers(peers: &[(&str, u64, u32)]) -> Arc<AddressBook> {
    let now = Utc::now();
    let first_success = now - chrono::Duration::hours(2);

    let address_book = Arc::new(AddressBook::new());
    for (addr, services, version) in peers {
        let addr: SocketAddr = addr.parse().expect("test addresses are valid");
        address_book.add_addresses([addr], first_success);

        for time in [first_success, now] {
            address_book.good(
                addr,
                PeerServices::from_bits_retain(*services),
                Version(*version),
                time,
            );
        }
    }

    address_book
}

async fn start_server(address_book: Arc<AddressBook>) -> (JoinHandle<()>, SocketAddr) {
    init(
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        address_book,
    )
    .await
    .expect("test listener binds")
}

// Minimal HTTP client used by the tests, so we can check the exact wire responses.
async fn http_request(addr: SocketAddr, method: &str, path: &str) -> Option<(u16, String)> {
    let mut stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr))
        .await
        .expect("connect timeout")
        .expect("connect ok");
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
    );
    timeout(Duration::from_secs(2), stream.write_all(request.as_bytes()))
        .await
        .expect("write timeout")
        .expect("write ok");

    let mut buf = Vec::new();
    timeout(Duration::from_secs(2), stream.read_to_end(&mut buf))
        .await
        .expect("read timeout")
        .ok()?;

    let text = String::from_utf8_lossy(&buf).to_string();
    let status = text
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    Some((status, text))
}

/// Returns the good peers in a response body, in sorted order.
fn good_peers(response: &str) -> Vec<GoodPeer> {
    let (_headers, body) = response
        .split_once("\r\n\r\n")
        .expect("response has a body");

    let mut peers: Vec<GoodPeer> = body
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is a JSON object"))
        .collect();
    peers.sort_by(|a, b| a.host.cmp(&b.host));

    peers
}

#[tokio::test]
async fn get_addrs_returns_good_peers() {
    zebra_seeder_test::init();

    let address_book = address_book_with_good_peers(&[
        ("8.8.8.8:8233", 1, 170_100),
        ("[2a01:4f8::1]:8233", 0x401, 170_000),
    ]);
    // Untested peers are never served.
    address_book.add_addresses(["1.1.1.1:8233".parse().unwrap()], Utc::now());

    let (task, addr) = start_server(address_book).await;

    let (status, response) = http_request(addr, "GET", "/api/addrs").await.unwrap();
    assert_eq!(status, 200);
    assert!(response.contains("content-type: text/plain; charset=utf-8"));
    assert!(response.contains("server: zebra-seeder"));
    assert!(response.contains(r#"{"host":"8.8.8.8:8233","services":1,"pver":170100}"#));
    assert_eq!(
        good_peers(&response),
        vec![
            GoodPeer {
                host: "8.8.8.8:8233".to_string(),
                services: 1,
                protocol_version: 170_100,
            },
            GoodPeer {
                host: "[2a01:4f8::1]:8233".to_string(),
                services: 0x401,
                protocol_version: 170_000,
            },
        ]
    );

    task.abort();
}

#[tokio::test]
async fn get_addrs_applies_filters() {
    zebra_seeder_test::init();

    let address_book = address_book_with_good_peers(&[
        ("8.8.8.8:8233", 1, 170_100),
        ("9.9.9.9:8233", 0x401, 170_000),
        ("[2a01:4f8::1]:8233", 0x401, 170_200),
    ]);
    let (task, addr) = start_server(address_book).await;

    let hosts = |response: String| -> Vec<String> {
        good_peers(&response)
            .into_iter()
            .map(|peer| peer.host)
            .collect()
    };

    let fixtures = [
        ("/api/addrs?ipversion=4", vec!["8.8.8.8:8233", "9.9.9.9:8233"]),
        ("/api/addrs?ipversion=6", vec!["[2a01:4f8::1]:8233"]),
        ("/api/addrs?pver=170100", vec!["8.8.8.8:8233", "[2a01:4f8::1]:8233"]),
        ("/api/addrs?services=1024", vec!["9.9.9.9:8233", "[2a01:4f8::1]:8233"]),
        ("/api/addrs?ipversion=4&services=1025", vec!["9.9.9.9:8233"]),
        ("/api/addrs?pver=999999", vec![]),
        // Invalid and unknown values don't filter
        (
            "/api/addrs?ipversion=5&pver=new&unknown=1",
            vec!["8.8.8.8:8233", "9.9.9.9:8233", "[2a01:4f8::1]:8233"],
        ),
    ];

    for (path, expected) in fixtures {
        let (status, response) = http_request(addr, "GET", path).await.unwrap();
        assert_eq!(status, 200, "{path}");
        assert_eq!(hosts(response), expected, "{path}");
    }

    task.abort();
}

#[tokio::test]
async fn get_addrs_empty_address_book() {
    zebra_seeder_test::init();

    let (task, addr) = start_server(Arc::new(AddressBook::new())).await;

    let (status, response) = http_request(addr, "GET", "/api/addrs").await.unwrap();
    assert_eq!(status, 200);
    assert!(response.contains("content-length: 0"));
    assert_eq!(good_peers(&response), Vec::new());

    task.abort();
}

#[tokio::test]
async fn unknown_paths_and_methods_are_rejected() {
    zebra_seeder_test::init();

    let (task, addr) = start_server(Arc::new(AddressBook::new())).await;

    let (status, response) = http_request(addr, "GET", "/api/nodes").await.unwrap();
    assert_eq!(status, 404);
    assert!(response.ends_with(NOT_FOUND_MSG));

    let (status, response) = http_request(addr, "POST", "/api/addrs").await.unwrap();
    assert_eq!(status, 405);
    assert!(response.ends_with(METHOD_NOT_ALLOWED_MSG));

    task.abort();
}

#[tokio::test]
async fn listener_bind_failure_is_an_error() {
    zebra_seeder_test::init();

    let (task, addr) = start_server(Arc::new(AddressBook::new())).await;

    assert!(init(addr, Arc::new(AddressBook::new())).await.is_err());

    task.abort();
}

#[test]
fn query_filters_are_parsed() {
    zebra_seeder_test::init();

    assert_eq!(parse_filter(""), GoodAddressFilter::default());
    assert_eq!(
        parse_filter("ipversion=6&pver=170100&services=5"),
        GoodAddressFilter {
            ip_version: IpVersion::V6,
            min_version: Version(170_100),
            required_services: PeerServices::from_bits_retain(5),
        }
    );
    assert_eq!(
        parse_filter("ipversion=0&pver=-1&services=0x1&ipversion"),
        GoodAddressFilter::default()
    );
}

#[test]
fn recent_requests_are_limited() {
    zebra_seeder_test::init();

    let start = Instant::now();
    let mut recent_requests = RecentRequests::new(start);

    for _ in 0..MAX_RECENT_REQUESTS {
        assert!(recent_requests.allow(start));
    }
    assert!(!recent_requests.allow(start));
    assert!(!recent_requests.allow(start + RECENT_REQUEST_INTERVAL));

    // The request that resets the limit uses up one slot in the new interval.
    let later = start + RECENT_REQUEST_INTERVAL + Duration::from_millis(1);
    assert!(recent_requests.allow(later));
    for _ in 1..MAX_RECENT_REQUESTS {
        assert!(recent_requests.allow(later));
    }
    assert!(!recent_requests.allow(later));
}
