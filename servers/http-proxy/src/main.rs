//! Component G's server binary: wires the shared `ProxyContext` cache
//! into a `ConnectionServer`, plus a best-effort SIGUSR1 cache-summary
//! handler (see SPEC_FULL.md §4.G's ambient/supplemental note).

use clap::{App, Arg};
use flux::logging;
use flux::time::timestamp_secs;
use netcore::ConnectionServer;
use proxy::{handle_connection, Cache, ProxyContext};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const DEFAULT_UPSTREAM_PORT: u16 = 80;

/// Polls `flag` and, when raised, logs a diagnostic summary of the cache
/// without blocking on its mutex, per §4.G's "reads the cache without the
/// mutex (best-effort diagnostic)". Runs for the lifetime of the process.
fn run_signal_watcher(cache: Arc<Mutex<Cache>>, flag: Arc<AtomicBool>, logger: slog::Logger) {
    loop {
        thread::sleep(Duration::from_millis(200));
        if flag.swap(false, Ordering::SeqCst) {
            match cache.try_lock() {
                Ok(cache) => {
                    let now = timestamp_secs();
                    let summary = cache.summary(now);
                    let fresh = summary.iter().filter(|(_, is_fresh)| *is_fresh).count();
                    logging::info!(
                        logger,
                        "cache summary";
                        "entries" => summary.len(),
                        "fresh" => fresh,
                        "stale" => summary.len() - fresh
                    );
                }
                Err(_) => {
                    logging::info!(logger, "cache summary unavailable, lock held");
                }
            }
        }
    }
}

fn main() {
    let matches = App::new("HTTP Caching Proxy")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("A caching, conditional-GET-aware HTTP/1.0 forward proxy.")
        .arg(Arg::with_name("IP").help("Address to bind").required(true))
        .arg(Arg::with_name("PORT").help("Port to listen on").required(true))
        .arg(
            Arg::with_name("upstream-port")
                .long("upstream-port")
                .takes_value(true)
                .help("Upstream port to connect to (default 80)"),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .help("Path to a TOML server config overriding the defaults"),
        )
        .get_matches();

    let ip = matches.value_of("IP").unwrap();
    let port: u16 = matches.value_of("PORT").unwrap().parse().unwrap_or_else(|_| {
        eprintln!("PORT must be a valid u16");
        process::exit(1);
    });
    let upstream_port: u16 = match matches.value_of("upstream-port") {
        Some(value) => value.parse().unwrap_or_else(|_| {
            eprintln!("upstream-port must be a valid u16");
            process::exit(1);
        }),
        None => DEFAULT_UPSTREAM_PORT,
    };

    let logger = match matches.value_of("config") {
        Some(path) => logging::init_from_file(path),
        None => logging::init(),
    };

    logging::info!(logger, "starting http proxy"; "ip" => ip, "port" => port, "upstream_port" => upstream_port);

    let cache = Arc::new(Mutex::new(Cache::new()));
    let ctx = ProxyContext::new(cache.clone(), upstream_port, logger.clone());

    let signal_flag = Arc::new(AtomicBool::new(false));
    if let Err(err) = signal_hook::flag::register(signal_hook::consts::SIGUSR1, signal_flag.clone()) {
        logging::error!(logger, "failed installing SIGUSR1 handler"; "error" => format!("{}", err));
    } else {
        let watcher_logger = logger.clone();
        thread::spawn(move || run_signal_watcher(cache, signal_flag, watcher_logger));
    }

    let server = ConnectionServer::new(ctx, logger.clone())
        .bind_address(ip)
        .and_then(|s| s.port(port))
        .and_then(|s| s.add_handler(handle_connection));

    let server = match server {
        Ok(server) => server,
        Err(err) => {
            logging::error!(logger, "configuration error"; "error" => format!("{}", err));
            process::exit(1);
        }
    };

    match server.exec() {
        Ok(()) => process::exit(0),
        Err(err) => {
            logging::error!(logger, "server exited with error"; "error" => format!("{}", err));
            process::exit(1);
        }
    }
}
