//! Component D's server binary: wires the central broker task to a
//! `ConnectionServer<ChatServerContext>` over SBCP.

use chatbroker::{handle_connection, ChatBroker, ChatServerContext};
use clap::{App, Arg};
use flux::config::load_or_default;
use flux::logging;
use netcore::ConnectionServer;
use std::process;

/// The SBCP-specific fields this binary needs on top of the shared
/// `ServerSettings`; `max_clients` below is the CLI-mandated third
/// positional argument and takes precedence over any config file value.
fn main() {
    let matches = App::new("Chat Server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the SBCP chat broker.")
        .arg(Arg::with_name("IP").help("Address to bind").required(true))
        .arg(Arg::with_name("PORT").help("Port to listen on").required(true))
        .arg(
            Arg::with_name("MAX_CLIENTS")
                .help("Maximum number of concurrently joined clients")
                .required(true),
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
    let max_clients: usize = matches.value_of("MAX_CLIENTS").unwrap().parse().unwrap_or_else(|_| {
        eprintln!("MAX_CLIENTS must be a valid non-negative integer");
        process::exit(1);
    });

    let logger = match matches.value_of("config") {
        Some(path) => logging::init_from_file(path),
        None => logging::init(),
    };

    let settings: flux::config::ServerSettings = load_or_default(matches.value_of("config"));

    logging::info!(logger, "starting chat server"; "ip" => ip, "port" => port, "max_clients" => max_clients);

    let broker = ChatBroker::spawn(max_clients, logger.clone());
    let ctx = ChatServerContext::new(broker.sender(), logger.clone());

    let server = ConnectionServer::new(ctx, logger.clone())
        .bind_address(ip)
        .and_then(|s| s.port(port))
        .and_then(|s| s.backlog(settings.backlog))
        .and_then(|s| s.accept_timeout_secs(settings.accept_timeout_secs))
        .and_then(|s| s.max_timeouts(settings.max_timeouts))
        .and_then(|s| s.max_clients(max_clients))
        .and_then(|s| s.add_handler(handle_connection));

    let server = match server {
        Ok(server) => server,
        Err(err) => {
            logging::error!(logger, "configuration error"; "error" => format!("{}", err));
            process::exit(1);
        }
    };

    let result = server.exec();
    broker.join();

    match result {
        Ok(()) => process::exit(0),
        Err(err) => {
            logging::error!(logger, "server exited with error"; "error" => format!("{}", err));
            process::exit(1);
        }
    }
}
