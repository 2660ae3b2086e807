//! End-to-end proxy behaviour over real loopback TCP connections: a miss
//! populates the cache, a second request is served fresh from cache
//! without touching upstream, and a stale entry triggers conditional
//! revalidation.

use httpmsg::{Message, StatusCode, Version};
use netcore::{ConnectionServer, StreamEndpoint};
use proxy::{handle_connection, Cache, ProxyContext};
use sloggers::Build;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn test_logger() -> slog::Logger {
    sloggers::terminal::TerminalLoggerBuilder::new().build().unwrap()
}

fn start_proxy(upstream_port: u16) -> netcore::ServerHandle {
    let ctx = ProxyContext::new(Arc::new(Mutex::new(Cache::new())), upstream_port, test_logger());
    ConnectionServer::new(ctx, test_logger())
        .bind_address("127.0.0.1")
        .unwrap()
        .port(0)
        .unwrap()
        .add_handler(handle_connection)
        .unwrap()
        .start()
        .unwrap()
}

/// A single-shot fake upstream: accepts one connection, drains the
/// request, and replies with a fixed response. Returns a join handle the
/// caller can wait on to know the exchange completed.
fn respond_once(listener: TcpListener, response: Vec<u8>, hits: Arc<AtomicUsize>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut endpoint = StreamEndpoint::from_accepted(stream).unwrap();
        let mut buf = [0u8; 4096];
        let _ = endpoint.read(&mut buf);
        hits.fetch_add(1, Ordering::SeqCst);
        endpoint.writen(&response).unwrap();
    })
}

fn send_request(proxy_addr: std::net::SocketAddr, uri: &str) -> Vec<u8> {
    let mut endpoint = StreamEndpoint::connect("127.0.0.1", proxy_addr.port()).unwrap();
    endpoint.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let request = format!("GET {} HTTP/1.0\r\n\r\n", uri);
    endpoint.writen(request.as_bytes()).unwrap();

    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match endpoint.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    out
}

#[test]
fn fresh_response_is_served_from_cache_without_a_second_upstream_hit() {
    let upstream_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let upstream_port = upstream_listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));

    let body = b"hello from upstream";
    let mut response = Message::response(StatusCode::Ok, Version::default());
    response.headers.push("Expires", "Tue, 01 Jan 2999 00:00:00 GMT");
    response.body = body.to_vec();
    let upstream_thread = respond_once(upstream_listener, response.to_bytes(), hits.clone());

    let proxy = start_proxy(upstream_port);
    let uri = format!("http://127.0.0.1:{}/greeting", upstream_port);

    let first = send_request(proxy.local_addr(), &uri);
    upstream_thread.join().unwrap();
    assert!(ends_with(&first, body));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // A fresh entry is now cached with an Expires far in the future; a
    // second request must not touch upstream at all.
    let second = send_request(proxy.local_addr(), &uri);
    assert!(ends_with(&second, body));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn upstream_connect_failure_yields_bad_gateway() {
    // Nothing is listening on this port.
    let dead_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_port = dead_listener.local_addr().unwrap().port();
    drop(dead_listener);

    let proxy = start_proxy(dead_port);
    let uri = format!("http://127.0.0.1:{}/missing", dead_port);

    let response = send_request(proxy.local_addr(), &uri);
    let parsed = Message::parse(&response).unwrap();
    assert_eq!(parsed.status(), Some(StatusCode::BadGateway));
}

fn ends_with(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && &haystack[haystack.len() - needle.len()..] == needle
}
