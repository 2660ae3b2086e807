//! Blocking byte-framed I/O over a single connected socket, plus the name
//! resolution rules used to construct one as a client.
//!
//! Mirrors the shape of the teacher's `net::endpoint::Endpoint` (one struct
//! owning a socket handle and the bookkeeping to read/write it) but talks
//! to `std::net` directly instead of polling through `mio`, since this
//! crate's connection model is blocking-I/O-per-thread rather than
//! non-blocking-I/O-multiplexed (see DESIGN.md).

use flux::error::{ErrorType, NetworkError, NetworkResult};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Resolves `host` to its canonical IPv6 address following the rules in
/// §4.A: literal IPv6 as-is, a name resolved via the system resolver
/// (A records promoted to `::ffff:x.x.x.x`), or a literal IPv4 address
/// promoted the same way.
pub fn resolve_peer_ip(host: &str) -> NetworkResult<Ipv6Addr> {
    if host.contains(':') {
        return host
            .parse::<Ipv6Addr>()
            .map_err(|_| NetworkError::Fatal(ErrorType::AddrParse));
    }

    if host.chars().any(|c| c.is_ascii_alphabetic()) {
        let mut addrs = (host, 0u16)
            .to_socket_addrs()
            .map_err(|_| NetworkError::Fatal(ErrorType::HostResolution))?;
        return addrs
            .find_map(|addr| match addr.ip() {
                std::net::IpAddr::V4(v4) => Some(v4.to_ipv6_mapped()),
                std::net::IpAddr::V6(v6) => Some(v6),
            })
            .ok_or(NetworkError::Fatal(ErrorType::HostResolution));
    }

    host.parse::<Ipv4Addr>()
        .map(|v4| v4.to_ipv6_mapped())
        .map_err(|_| NetworkError::Fatal(ErrorType::AddrParse))
}

/// A connected TCP socket with the exactly-`len`-bytes read/write
/// primitives the rest of the workspace builds its protocols on.
pub struct StreamEndpoint {
    stream: TcpStream,
    peer_ip: Ipv6Addr,
}

impl StreamEndpoint {
    /// Client-side constructor: resolves `host`, connects to `(host, port)`.
    pub fn connect(host: &str, port: u16) -> NetworkResult<StreamEndpoint> {
        let peer_ip = resolve_peer_ip(host)?;
        let stream = TcpStream::connect((host, port)).map_err(NetworkError::from)?;
        Ok(StreamEndpoint { stream, peer_ip })
    }

    /// Server-side constructor: wraps an already-accepted stream, deriving
    /// `peer_ip` from the socket's actual peer address.
    pub fn from_accepted(stream: TcpStream) -> NetworkResult<StreamEndpoint> {
        let peer_addr = stream.peer_addr().map_err(NetworkError::from)?;
        let peer_ip = match peer_addr.ip() {
            std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            std::net::IpAddr::V6(v6) => v6,
        };
        Ok(StreamEndpoint { stream, peer_ip })
    }

    #[inline]
    pub fn peer_ip(&self) -> Ipv6Addr {
        self.peer_ip
    }

    pub fn try_clone(&self) -> NetworkResult<StreamEndpoint> {
        Ok(StreamEndpoint {
            stream: self.stream.try_clone().map_err(NetworkError::from)?,
            peer_ip: self.peer_ip,
        })
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> NetworkResult<()> {
        self.stream.set_read_timeout(timeout).map_err(NetworkError::from)
    }

    /// Writes exactly `buf.len()` bytes, retrying on `Interrupted`.
    pub fn writen(&mut self, buf: &[u8]) -> NetworkResult<()> {
        let mut offset = 0;
        while offset < buf.len() {
            match self.stream.write(&buf[offset..]) {
                Ok(0) => return Err(NetworkError::UnexpectedEof),
                Ok(n) => offset += n,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NetworkError::from(err)),
            }
        }
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes, failing with `UnexpectedEof` on
    /// premature close.
    pub fn readn(&mut self, buf: &mut [u8]) -> NetworkResult<()> {
        let mut offset = 0;
        while offset < buf.len() {
            match self.stream.read(&mut buf[offset..]) {
                Ok(0) => return Err(NetworkError::UnexpectedEof),
                Ok(n) => offset += n,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NetworkError::from(err)),
            }
        }
        Ok(())
    }

    /// Reads byte-by-byte until LF or `buf.len() - 1` bytes have been
    /// consumed. Null-terminates the buffer when a newline was seen.
    /// Returns the number of bytes read (0 on immediate EOF).
    pub fn readline(&mut self, buf: &mut [u8]) -> NetworkResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let maxlen = buf.len() - 1;
        let mut count = 0;
        let mut byte = [0u8; 1];

        while count < maxlen {
            match self.stream.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    buf[count] = byte[0];
                    count += 1;
                    if byte[0] == b'\n' {
                        buf[count] = 0;
                        return Ok(count);
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NetworkError::from(err)),
            }
        }

        Ok(count)
    }

    /// Single-syscall passthrough read; may return short.
    pub fn read(&mut self, buf: &mut [u8]) -> NetworkResult<usize> {
        self.stream.read(buf).map_err(NetworkError::from)
    }

    /// Single-syscall passthrough write; may return short.
    pub fn write(&mut self, buf: &[u8]) -> NetworkResult<usize> {
        self.stream.write(buf).map_err(NetworkError::from)
    }
}

/// A UDP socket that starts out unconnected and anchors itself to the first
/// peer address it observes, per §4.A's "two-phase mode".
pub struct DatagramEndpoint {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl DatagramEndpoint {
    pub fn bind(bind_addr: &str, port: u16) -> NetworkResult<DatagramEndpoint> {
        let socket = UdpSocket::bind((bind_addr, port)).map_err(NetworkError::from)?;
        Ok(DatagramEndpoint { socket, peer: None })
    }

    /// Binds an ephemeral port and immediately connects it to `peer` -- used
    /// by the TFTP per-transfer worker, which knows its peer up front.
    pub fn connected_to(peer: SocketAddr) -> NetworkResult<DatagramEndpoint> {
        let socket = UdpSocket::bind(("::", 0)).map_err(NetworkError::from)?;
        socket.connect(peer).map_err(NetworkError::from)?;
        Ok(DatagramEndpoint {
            socket,
            peer: Some(peer),
        })
    }

    #[inline]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> NetworkResult<()> {
        self.socket.set_read_timeout(timeout).map_err(NetworkError::from)
    }

    /// Reads one datagram. On the first call against an unconnected socket,
    /// captures the sender's address and `connect()`s to it so subsequent
    /// I/O is address-free.
    pub fn read(&mut self, buf: &mut [u8]) -> NetworkResult<usize> {
        if self.peer.is_some() {
            return self.socket.recv(buf).map_err(NetworkError::from);
        }

        let (n, from) = self.socket.recv_from(buf).map_err(NetworkError::from)?;
        self.socket.connect(from).map_err(NetworkError::from)?;
        self.peer = Some(from);
        Ok(n)
    }

    pub fn write(&mut self, buf: &[u8]) -> NetworkResult<usize> {
        match self.peer {
            Some(peer) => self.socket.send_to(buf, peer).map_err(NetworkError::from),
            None => self.socket.send(buf).map_err(NetworkError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn writen_readn_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ep = StreamEndpoint::from_accepted(stream).unwrap();
            let mut buf = [0u8; 5];
            ep.readn(&mut buf).unwrap();
            ep.writen(&buf).unwrap();
        });

        let mut client = StreamEndpoint::connect("127.0.0.1", addr.port()).unwrap();
        client.writen(b"hello").unwrap();
        let mut buf = [0u8; 5];
        client.readn(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        server.join().unwrap();
    }

    #[test]
    fn readn_fails_on_premature_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut client = StreamEndpoint::connect("127.0.0.1", addr.port()).unwrap();
        let mut buf = [0u8; 5];
        server.join().unwrap();
        assert!(matches!(client.readn(&mut buf), Err(NetworkError::UnexpectedEof)));
    }

    #[test]
    fn readline_null_terminates_on_newline() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ep = StreamEndpoint::from_accepted(stream).unwrap();
            let mut buf = [0u8; 16];
            let n = ep.readline(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"hello\n");
            assert_eq!(buf[n], 0);
        });

        let mut client = StreamEndpoint::connect("127.0.0.1", addr.port()).unwrap();
        client.writen(b"hello\n").unwrap();
        server.join().unwrap();
    }

    #[test]
    fn ipv4_literal_is_promoted_to_mapped_ipv6() {
        let ip = resolve_peer_ip("127.0.0.1").unwrap();
        assert_eq!(ip, Ipv4Addr::new(127, 0, 0, 1).to_ipv6_mapped());
    }
}
