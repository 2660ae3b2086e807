//! End-to-end broker behaviour over real loopback TCP connections: two
//! clients join, one speaks, the other observes FWD, and leaving triggers
//! OFFLINE.

use chatbroker::{handle_connection, read_message, write_message, ChatBroker, ChatServerContext};
use netcore::{ConnectionServer, StreamEndpoint};
use sbcp::frame::MessageType;
use sbcp::Message;
use sloggers::Build;
use std::time::Duration;

fn test_logger() -> slog::Logger {
    sloggers::terminal::TerminalLoggerBuilder::new().build().unwrap()
}

fn start_server(max_clients: usize) -> (netcore::ServerHandle, ChatBroker) {
    let logger = test_logger();
    let broker = ChatBroker::spawn(max_clients, logger.clone());
    let ctx = ChatServerContext::new(broker.sender(), logger.clone());

    let handle = ConnectionServer::new(ctx, logger)
        .bind_address("127.0.0.1")
        .unwrap()
        .port(0)
        .unwrap()
        .add_handler(handle_connection)
        .unwrap()
        .start()
        .unwrap();

    (handle, broker)
}

fn join(addr: std::net::SocketAddr, username: &str) -> StreamEndpoint {
    let mut endpoint = StreamEndpoint::connect(&addr.ip().to_string(), addr.port()).unwrap();
    endpoint.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    write_message(&mut endpoint, &Message::join(username)).unwrap();
    endpoint
}

#[test]
fn second_join_receives_ack_and_first_receives_online() {
    let (handle, _broker) = start_server(10);
    let addr = handle.local_addr();

    let mut alice = join(addr, "alice");
    let ack = read_message(&mut alice).unwrap();
    assert_eq!(ack.message_type, MessageType::Ack);
    assert_eq!(ack.client_count(), Some(1));

    let mut bob = join(addr, "bob");
    let ack = read_message(&mut bob).unwrap();
    assert_eq!(ack.message_type, MessageType::Ack);
    assert_eq!(ack.client_count(), Some(2));

    let online = read_message(&mut alice).unwrap();
    assert_eq!(online.message_type, MessageType::Online);
    assert_eq!(online.username(), Some("bob"));
}

#[test]
fn send_is_forwarded_to_other_sessions_only() {
    let (handle, _broker) = start_server(10);
    let addr = handle.local_addr();

    let mut alice = join(addr, "alice");
    read_message(&mut alice).unwrap(); // ACK

    let mut bob = join(addr, "bob");
    read_message(&mut bob).unwrap(); // ACK
    read_message(&mut alice).unwrap(); // ONLINE(bob)

    write_message(&mut bob, &Message::send("hello room")).unwrap();

    let fwd = read_message(&mut alice).unwrap();
    assert_eq!(fwd.message_type, MessageType::Fwd);
    assert_eq!(fwd.username(), Some("bob"));
    assert_eq!(fwd.text(), Some("hello room"));
}

#[test]
fn duplicate_username_is_nakd() {
    let (handle, _broker) = start_server(10);
    let addr = handle.local_addr();

    let mut alice = join(addr, "alice");
    read_message(&mut alice).unwrap(); // ACK

    let mut alice2 = join(addr, "alice");
    let nak = read_message(&mut alice2).unwrap();
    assert_eq!(nak.message_type, MessageType::Nak);
    assert_eq!(nak.reason(), Some("Username already exists"));
}

#[test]
fn disconnect_broadcasts_offline() {
    let (handle, _broker) = start_server(10);
    let addr = handle.local_addr();

    let mut alice = join(addr, "alice");
    read_message(&mut alice).unwrap(); // ACK

    let mut bob = join(addr, "bob");
    read_message(&mut bob).unwrap(); // ACK
    read_message(&mut alice).unwrap(); // ONLINE(bob)

    drop(bob);

    let offline = read_message(&mut alice).unwrap();
    assert_eq!(offline.message_type, MessageType::Offline);
    assert_eq!(offline.username(), Some("bob"));
}
