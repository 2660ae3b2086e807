//! Reads and writes whole SBCP messages over a `StreamEndpoint`.
//!
//! `sbcp::Message` frames against `io::Read`/`io::Write`; `StreamEndpoint`
//! deliberately exposes exactly-n read/write primitives instead of those
//! traits (see `netcore::endpoint`), so this glues the two together one
//! header-then-payload at a time.

use netcore::StreamEndpoint;
use sbcp::frame::{Header, HEADER_SIZE};
use sbcp::{Message, MessageError};

pub fn read_message(endpoint: &mut StreamEndpoint) -> Result<Message, MessageError> {
    let mut header_buf = [0u8; HEADER_SIZE];
    endpoint
        .readn(&mut header_buf)
        .map_err(|err| MessageError::Header(sbcp::frame::HeaderError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))))?;

    let header = Header::read(&header_buf[..])?;

    let mut payload = vec![0u8; header.length as usize];
    endpoint
        .readn(&mut payload)
        .map_err(|err| MessageError::Header(sbcp::frame::HeaderError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))))?;

    let mut full = Vec::with_capacity(HEADER_SIZE + payload.len());
    full.extend_from_slice(&header_buf);
    full.extend_from_slice(&payload);
    Message::read(&full[..])
}

pub fn write_message(endpoint: &mut StreamEndpoint, message: &Message) -> std::io::Result<()> {
    let mut buf = Vec::new();
    message.write(&mut buf)?;
    endpoint
        .writen(&buf)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
}
