//! The SBCP terminal client: joins, prints every ONLINE/OFFLINE/FWD
//! event it receives, and forwards stdin lines as SEND. After 10 seconds
//! of stdin silence it sends an IDLE announcement instead, per §5's
//! "client considers itself idle after 10 seconds of stdin silence".

use chatbroker::{read_message, write_message};
use clap::{App, Arg};
use flux::logging;
use netcore::StreamEndpoint;
use sbcp::frame::MessageType;
use sbcp::Message;
use std::io::BufRead;
use std::process;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const IDLE_AFTER: Duration = Duration::from_secs(10);

fn print_incoming(msg: &Message) {
    match msg.message_type {
        MessageType::Online => println!("* {} has joined", msg.username().unwrap_or("?")),
        MessageType::Offline => println!("* {} has left", msg.username().unwrap_or("?")),
        MessageType::Fwd => println!("{}: {}", msg.username().unwrap_or("?"), msg.text().unwrap_or("")),
        MessageType::Idle => println!("* {} is idle", msg.username().unwrap_or("someone")),
        other => println!("* unexpected message from server: {:?}", other),
    }
}

fn main() {
    let matches = App::new("Chat Client")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Connects to the SBCP chat broker.")
        .arg(Arg::with_name("USERNAME").help("Username to join as").required(true))
        .arg(Arg::with_name("SERVER").help("Broker address").required(true))
        .arg(Arg::with_name("PORT").help("Broker port").required(true))
        .get_matches();

    let username = matches.value_of("USERNAME").unwrap().to_string();
    let server = matches.value_of("SERVER").unwrap();
    let port: u16 = matches.value_of("PORT").unwrap().parse().unwrap_or_else(|_| {
        eprintln!("PORT must be a valid u16");
        process::exit(1);
    });

    let logger = logging::init();

    let mut endpoint = match StreamEndpoint::connect(server, port) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            logging::error!(logger, "failed connecting to broker"; "error" => format!("{}", err));
            process::exit(1);
        }
    };

    if write_message(&mut endpoint, &Message::join(&username)).is_err() {
        eprintln!("failed sending JOIN");
        process::exit(1);
    }

    let greeting = match read_message(&mut endpoint) {
        Ok(msg) => msg,
        Err(err) => {
            eprintln!("failed reading server greeting: {}", err);
            process::exit(1);
        }
    };

    match greeting.message_type {
        MessageType::Nak => {
            eprintln!("join rejected: {}", greeting.reason().unwrap_or("unknown reason"));
            process::exit(1);
        }
        MessageType::Ack => {
            println!("* joined as {} ({} online)", username, greeting.client_count().unwrap_or(1));
        }
        other => {
            eprintln!("unexpected greeting from server: {:?}", other);
            process::exit(1);
        }
    }

    let mut reader_endpoint = match endpoint.try_clone() {
        Ok(endpoint) => endpoint,
        Err(err) => {
            eprintln!("failed cloning endpoint: {}", err);
            process::exit(1);
        }
    };
    let reader = thread::spawn(move || {
        while let Ok(msg) = read_message(&mut reader_endpoint) {
            print_incoming(&msg);
        }
    });

    let (lines_tx, lines_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if lines_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    loop {
        match lines_rx.recv_timeout(IDLE_AFTER) {
            Ok(line) => {
                if write_message(&mut endpoint, &Message::send(&line)).is_err() {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if write_message(&mut endpoint, &Message::idle(None)).is_err() {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(endpoint);
    let _ = reader.join();
}
