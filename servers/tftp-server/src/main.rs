//! Component C's server binary: a `DatagramServer<TftpContext>` rooted at
//! the current directory, defaulting to port 8080 to match the reference
//! configuration (see §6).

use clap::{App, Arg};
use flux::logging;
use netcore::DatagramServer;
use std::process;
use tftp::{handle_request, TftpContext};

const DEFAULT_PORT: u16 = 8080;

fn main() {
    let matches = App::new("TFTP Server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Serves files under the current directory over RFC 1350 TFTP.")
        .arg(Arg::with_name("BIND_ADDR").help("Address to bind").required(false))
        .arg(Arg::with_name("PORT").help("Port to listen on").required(false))
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .help("Path to a TOML server config overriding the defaults"),
        )
        .get_matches();

    let bind_addr = matches.value_of("BIND_ADDR").unwrap_or("::");
    let port: u16 = match matches.value_of("PORT") {
        Some(value) => value.parse().unwrap_or_else(|_| {
            eprintln!("PORT must be a valid u16");
            process::exit(1);
        }),
        None => DEFAULT_PORT,
    };

    let logger = match matches.value_of("config") {
        Some(path) => logging::init_from_file(path),
        None => logging::init(),
    };

    let root = std::env::current_dir().unwrap_or_else(|err| {
        eprintln!("failed resolving current directory: {}", err);
        process::exit(1);
    });

    logging::info!(logger, "starting tftp server"; "bind_addr" => bind_addr, "port" => port, "root" => root.display().to_string());

    let ctx = TftpContext::new(root, logger.clone());

    let server = DatagramServer::new(ctx, logger.clone())
        .bind_address(bind_addr)
        .and_then(|s| s.port(port))
        .and_then(|s| s.add_handler(handle_request));

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
