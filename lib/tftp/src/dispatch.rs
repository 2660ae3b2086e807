//! Top-level request dispatch: routes the first packet of a newly
//! anchored datagram session to [`crate::server::handle_rrq`] or
//! [`crate::server::handle_wrq`]. Registered with `netcore::DatagramServer`
//! the same way the chat broker registers its stream handler -- the
//! server's re-anchoring of `DatagramEndpoint` to the request's sender
//! already realizes RFC 1350's per-transfer TID, so this layer only needs
//! to pick a handler.

use crate::packet::{ErrorCode, Packet};
use crate::server::{handle_rrq, handle_wrq};
use netcore::DatagramEndpoint;
use slog::Logger;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared context handed to every datagram session by the datagram
/// server (the `Ctx` type parameter of `netcore::DatagramServer`).
pub struct TftpContext {
    pub root: PathBuf,
    pub logger: Logger,
}

impl TftpContext {
    pub fn new(root: PathBuf, logger: Logger) -> TftpContext {
        TftpContext { root, logger }
    }
}

/// The datagram handler registered with `DatagramServer`. Matches the
/// `DatagramHandler<Ctx>` blanket `Fn` impl so it can be passed straight to
/// `add_handler`.
pub fn handle_request(mut endpoint: DatagramEndpoint, first_packet: Vec<u8>, ctx: Arc<TftpContext>) {
    match Packet::parse(&first_packet) {
        Ok(Packet::Rrq { filename, mode }) => {
            handle_rrq(endpoint, &ctx.root, &filename, mode, &ctx.logger);
        }
        Ok(Packet::Wrq { filename, mode }) => {
            handle_wrq(endpoint, &ctx.root, &filename, mode, &ctx.logger);
        }
        Ok(other) => {
            slog::warn!(ctx.logger, "first packet was not RRQ/WRQ"; "packet" => format!("{:?}", other));
            let reply = Packet::Error {
                code: ErrorCode::IllegalOperation,
                message: ErrorCode::IllegalOperation.message().to_string(),
            };
            let _ = endpoint.write(&reply.encode());
        }
        Err(err) => {
            slog::debug!(ctx.logger, "failed parsing first packet"; "error" => format!("{}", err));
            let reply = Packet::Error {
                code: ErrorCode::IllegalOperation,
                message: ErrorCode::IllegalOperation.message().to_string(),
            };
            let _ = endpoint.write(&reply.encode());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Mode;
    use sloggers::terminal::TerminalLoggerBuilder;
    use sloggers::Build;
    use std::net::UdpSocket;
    use std::thread;
    use std::time::Duration;

    fn test_logger() -> Logger {
        TerminalLoggerBuilder::new().build().unwrap()
    }

    #[test]
    fn unsupported_mode_yields_illegal_operation_error() {
        let client_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        client_socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let client_addr = client_socket.local_addr().unwrap();
        let endpoint = DatagramEndpoint::connected_to(client_addr).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(TftpContext::new(dir.path().to_path_buf(), test_logger()));

        let garbage = vec![0u8, 9];
        let worker = thread::spawn(move || handle_request(endpoint, garbage, ctx));

        let mut buf = [0u8; 1024];
        let (n, _) = client_socket.recv_from(&mut buf).unwrap();
        match Packet::parse(&buf[..n]).unwrap() {
            Packet::Error { code: ErrorCode::IllegalOperation, .. } => {}
            other => panic!("unexpected packet: {:?}", other),
        }
        worker.join().unwrap();
    }

    #[test]
    fn rrq_is_routed_to_handle_rrq() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"content").unwrap();

        let client_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        client_socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let client_addr = client_socket.local_addr().unwrap();
        let endpoint = DatagramEndpoint::connected_to(client_addr).unwrap();

        let ctx = Arc::new(TftpContext::new(dir.path().to_path_buf(), test_logger()));
        let rrq = Packet::Rrq {
            filename: "a.txt".to_string(),
            mode: Mode::Octet,
        }
        .encode();
        let worker = thread::spawn(move || handle_request(endpoint, rrq, ctx));

        let mut buf = [0u8; 1024];
        let (n, from) = client_socket.recv_from(&mut buf).unwrap();
        match Packet::parse(&buf[..n]).unwrap() {
            Packet::Data { block: 1, payload } => assert_eq!(payload, b"content"),
            other => panic!("unexpected packet: {:?}", other),
        }

        let ack = Packet::Ack { block: 1 }.encode();
        client_socket.send_to(&ack, from).unwrap();
        worker.join().unwrap();
    }
}
