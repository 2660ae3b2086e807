//! The per-connection proxy handler: the ten-step forward/cache flow from
//! §4.G, registered with `netcore::ConnectionServer` the same way the chat
//! broker registers `chatbroker::session::handle_connection`.

use crate::cache::{hash_uri, Cache, CacheEntry};
use flux::time::timestamp_secs;
use httpmsg::{format_rfc1123, Message, Method, StatusCode, Version};
use netcore::StreamEndpoint;
use slog::Logger;
use std::sync::{Arc, Mutex};

/// Shared context handed to every accepted connection by the connection
/// server (the `Ctx` type parameter of `netcore::ConnectionServer`). The
/// cache lives behind its own `Arc` rather than being owned outright so
/// that `servers/http-proxy`'s SIGUSR1 watcher thread can hold a handle
/// to it independent of the `Arc<ProxyContext>` the connection server
/// wraps around the whole context.
pub struct ProxyContext {
    pub cache: Arc<Mutex<Cache>>,
    pub upstream_port: u16,
    pub logger: Logger,
}

impl ProxyContext {
    pub fn new(cache: Arc<Mutex<Cache>>, upstream_port: u16, logger: Logger) -> ProxyContext {
        ProxyContext {
            cache,
            upstream_port,
            logger,
        }
    }
}

/// Splits an absolute `http://host[:port]/path` request URI into `(host,
/// path)`, defaulting the path to `/` when absent, per §4.G step 2.
fn split_absolute_uri(uri: &str) -> Option<(String, String)> {
    let rest = uri.strip_prefix("http://")?;
    let slash = rest.find('/');
    match slash {
        Some(idx) => Some((rest[..idx].to_string(), rest[idx..].to_string())),
        None => Some((rest.to_string(), "/".to_string())),
    }
}

/// Reads from `endpoint` byte-by-byte until the four-byte header terminator
/// has been observed, per §4.G step 1. A proxy-bound GET/HEAD has no body,
/// so the header terminator is the end of the message.
fn read_request_head(endpoint: &mut StreamEndpoint) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = endpoint
            .read(&mut byte)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, format!("{}", err)))?;
        if n == 0 {
            break;
        }
        buf.push(byte[0]);
        if buf.len() >= 4 && &buf[buf.len() - 4..] == b"\r\n\r\n" {
            break;
        }
    }
    Ok(buf)
}

/// Reads from `endpoint` until the peer closes the connection, per §4.G
/// step 6's "consume the response until the upstream closes" -- HTTP/1.0
/// framing has no length prefix to rely on otherwise.
fn read_until_eof(endpoint: &mut StreamEndpoint) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = endpoint
            .read(&mut chunk)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, format!("{}", err)))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}

/// Computes the fresh entry's `expires_at` by the first matching rule in
/// §4.G step 8. The `Last-Modified` branch deliberately does not compute a
/// future expiry -- it yields the resource's own modification time, which
/// is always `<= now`, so the entry reads as stale on the very next
/// request. That mirrors the source proxy's own behaviour (see §9 / the
/// `REDESIGN FLAGS` discussion) and is preserved rather than "fixed".
fn compute_expires_at(response: &Message, now: u64) -> u64 {
    if let Some(expires) = response.expires(now) {
        return expires;
    }
    if let Some(last_modified) = response.last_modified() {
        return last_modified;
    }
    if let Some(date) = response.date() {
        return date;
    }
    now
}

enum Lookup {
    Fresh(Vec<u8>),
    Stale { expires_at: u64 },
    Miss,
}

fn lookup(ctx: &ProxyContext, key: u64, now: u64) -> Lookup {
    let mut cache = ctx.cache.lock().unwrap();
    match cache.get_mut(key) {
        Some(entry) if now < entry.expires_at => {
            entry.last_used = now;
            Lookup::Fresh(entry.response.clone())
        }
        Some(entry) => Lookup::Stale {
            expires_at: entry.expires_at,
        },
        None => Lookup::Miss,
    }
}

/// The connection handler registered with `ConnectionServer`. Matches the
/// `StreamHandler<Ctx>` blanket `Fn` impl so it can be passed straight to
/// `add_handler`.
pub fn handle_connection(mut endpoint: StreamEndpoint, ctx: Arc<ProxyContext>) {
    let raw = match read_request_head(&mut endpoint) {
        Ok(raw) if !raw.is_empty() => raw,
        _ => return,
    };

    let request = match Message::parse(&raw) {
        Ok(request) => request,
        Err(err) => {
            slog::debug!(ctx.logger, "failed parsing downstream request"; "error" => format!("{}", err));
            return;
        }
    };

    let uri = match request.uri() {
        Some(uri) => uri.to_string(),
        None => return,
    };
    let (host, path) = match split_absolute_uri(&uri) {
        Some(parts) => parts,
        None => {
            slog::debug!(ctx.logger, "request uri is not absolute"; "uri" => uri);
            return;
        }
    };

    let key = hash_uri(&uri);
    let now = timestamp_secs();

    let (conditional_since, cached_slot) = match lookup(&ctx, key, now) {
        Lookup::Fresh(body) => {
            let _ = endpoint.writen(&body);
            return;
        }
        Lookup::Stale { expires_at } => (Some(format_rfc1123(expires_at)), true),
        Lookup::Miss => (None, false),
    };

    let mut outbound = Message::request(Method::Get, path, Version::default());
    outbound.headers.push("Host", host.as_str());
    outbound.headers.push("Connection", "close");
    if let Some(since) = conditional_since {
        outbound.headers.push("If-Modified-Since", since);
    }

    let mut upstream = match StreamEndpoint::connect(host.as_str(), ctx.upstream_port) {
        Ok(upstream) => upstream,
        Err(err) => {
            slog::warn!(ctx.logger, "failed connecting upstream"; "host" => host.as_str(), "error" => format!("{}", err));
            let mut failure = Message::response(StatusCode::BadGateway, Version::default());
            failure.headers.push("Connection", "close");
            let _ = endpoint.writen(&failure.to_bytes());
            return;
        }
    };
    if upstream.writen(&outbound.to_bytes()).is_err() {
        return;
    }

    let raw_response = match read_until_eof(&mut upstream) {
        Ok(raw) => raw,
        Err(err) => {
            slog::warn!(ctx.logger, "failed reading upstream response"; "error" => format!("{}", err));
            return;
        }
    };
    let response = match Message::parse(&raw_response) {
        Ok(response) => response,
        Err(err) => {
            slog::debug!(ctx.logger, "failed parsing upstream response"; "error" => format!("{}", err));
            return;
        }
    };

    if cached_slot && response.status() == Some(StatusCode::NotModified) {
        let mut cache = ctx.cache.lock().unwrap();
        if let Some(entry) = cache.get_mut(key) {
            entry.last_used = now;
            let _ = endpoint.writen(&entry.response);
            return;
        }
    }

    let _ = endpoint.writen(&raw_response);

    let expires_at = compute_expires_at(&response, now);
    let mut cache = ctx.cache.lock().unwrap();
    cache.insert(
        key,
        CacheEntry {
            expires_at,
            last_used: now,
            response: raw_response,
        },
    );
}

