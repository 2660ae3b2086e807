//! The shared error taxonomy for blocking network I/O.
//!
//! Every protocol crate (`sbcp`, `tftp`, `httpmsg`, `proxy`) layers its own
//! protocol errors on top of this, but all of them bottom out in
//! `NetworkError` for anything that comes from a socket.

use std::fmt;
use std::io;
use std::net;

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Distinguishes a transient condition (caller should retry) from a fatal
/// one (caller should tear the connection down).
#[derive(Debug)]
pub enum NetworkError {
    /// The operation would have blocked; not an error for callers using
    /// non-blocking polling. Blocking callers never see this variant.
    Wait,
    /// The peer closed the connection before the full message arrived.
    UnexpectedEof,
    Fatal(ErrorType),
}

#[derive(Debug)]
pub enum ErrorType {
    AddrParse,
    HostResolution,
    Io(io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Wait => write!(f, "operation would block"),
            NetworkError::UnexpectedEof => write!(f, "peer closed connection early"),
            NetworkError::Fatal(err) => write!(f, "{}", err),
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::AddrParse => write!(f, "address parse error"),
            ErrorType::HostResolution => write!(f, "host resolution failed"),
            ErrorType::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for NetworkError {}
impl std::error::Error for ErrorType {}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => NetworkError::Wait,
            io::ErrorKind::UnexpectedEof => NetworkError::UnexpectedEof,
            _ => NetworkError::Fatal(ErrorType::Io(io_error)),
        }
    }
}

impl From<net::AddrParseError> for NetworkError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddrParse)
    }
}

/// Mirrors the teacher's `ErrorUtils`: lets callers ask "did this actually
/// fail" without matching out the `Wait` variant by hand.
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    #[inline]
    fn has_failed(&self) -> bool {
        !matches!(self, Ok(_) | Err(NetworkError::Wait))
    }
}
