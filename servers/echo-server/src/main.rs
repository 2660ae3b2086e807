//! Component A's reference server: a bare TCP echo loop, the simplest
//! possible tenant of `netcore::ConnectionServer`.

use clap::{App, Arg};
use flux::config::{load_or_default, ServerSettings};
use flux::logging;
use netcore::{ConnectionServer, StreamEndpoint};
use std::process;

fn echo(mut endpoint: StreamEndpoint, _ctx: std::sync::Arc<()>) {
    let mut buf = [0u8; 4096];
    loop {
        let n = match endpoint.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        if endpoint.writen(&buf[..n]).is_err() {
            break;
        }
    }
}

fn main() {
    let matches = App::new("Echo Server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Echoes every byte it reads back to the client.")
        .arg(Arg::with_name("PORT").help("Port to listen on").required(true))
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .help("Path to a TOML server config overriding the defaults"),
        )
        .get_matches();

    let port: u16 = matches
        .value_of("PORT")
        .unwrap()
        .parse()
        .unwrap_or_else(|_| {
            eprintln!("PORT must be a valid u16");
            process::exit(1);
        });

    let logger = match matches.value_of("config") {
        Some(path) => logging::init_from_file(path),
        None => logging::init(),
    };

    let settings: ServerSettings = load_or_default(matches.value_of("config"));

    logging::info!(logger, "starting echo server"; "port" => port);

    let server = ConnectionServer::new((), logger.clone())
        .bind_address(&settings.bind_address)
        .and_then(|s| s.port(port))
        .and_then(|s| s.backlog(settings.backlog))
        .and_then(|s| s.accept_timeout_secs(settings.accept_timeout_secs))
        .and_then(|s| s.max_timeouts(settings.max_timeouts))
        .and_then(|s| s.max_clients(settings.max_clients))
        .and_then(|s| s.add_handler(echo));

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
