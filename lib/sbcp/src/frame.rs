//! The 4-byte SBCP header and the message-type enumeration it carries.
//!
//! §4.C/§9 flag the reference implementation's packed `version:9 | type:7`
//! bitfield as host-endianness-dependent. This crate fixes one canonical
//! encoding instead: the first two bytes hold `version | (type << 9)` as a
//! little-endian `u16` (so the bit layout matches what a little-endian host
//! produces natively, the common case this protocol was authored against),
//! and the trailing `length` field is big-endian, matching §6's "network
//! byte order for multi-byte fields" for everything else on the wire.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

pub const VERSION: u16 = 3;
pub const HEADER_SIZE: usize = 4;
pub const MAX_PAYLOAD_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Join,
    Send,
    Fwd,
    Ack,
    Nak,
    Online,
    Offline,
    Idle,
}

impl MessageType {
    fn to_code(self) -> u16 {
        match self {
            MessageType::Join => 2,
            MessageType::Send => 4,
            MessageType::Fwd => 3,
            MessageType::Ack => 7,
            MessageType::Nak => 5,
            MessageType::Online => 8,
            MessageType::Offline => 6,
            MessageType::Idle => 9,
        }
    }

    fn from_code(code: u16) -> Option<MessageType> {
        Some(match code {
            2 => MessageType::Join,
            4 => MessageType::Send,
            3 => MessageType::Fwd,
            7 => MessageType::Ack,
            5 => MessageType::Nak,
            8 => MessageType::Online,
            6 => MessageType::Offline,
            9 => MessageType::Idle,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub message_type: MessageType,
    pub length: u16,
}

impl Header {
    pub fn write<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        let packed: u16 = VERSION | (self.message_type.to_code() << 9);
        writer.write_u16::<LittleEndian>(packed)?;
        writer.write_u16::<BigEndian>(self.length)
    }

    pub fn read<R: io::Read>(mut reader: R) -> Result<Header, HeaderError> {
        let packed = reader.read_u16::<LittleEndian>().map_err(HeaderError::Io)?;
        let length = reader.read_u16::<BigEndian>().map_err(HeaderError::Io)?;

        let version = packed & 0x1FF;
        if version != VERSION {
            return Err(HeaderError::InvalidVersion(version));
        }

        let type_code = packed >> 9;
        let message_type = MessageType::from_code(type_code).ok_or(HeaderError::InvalidType(type_code))?;

        Ok(Header { message_type, length })
    }
}

#[derive(Debug)]
pub enum HeaderError {
    InvalidVersion(u16),
    InvalidType(u16),
    Io(io::Error),
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderError::InvalidVersion(v) => write!(f, "invalid version: {}", v),
            HeaderError::InvalidType(t) => write!(f, "invalid message type: {}", t),
            HeaderError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for HeaderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = Header {
            message_type: MessageType::Fwd,
            length: 536,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let decoded = Header::read(&buf[..]).unwrap();
        assert_eq!(decoded.message_type, MessageType::Fwd);
        assert_eq!(decoded.length, 536);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut buf = Vec::new();
        // version=1, type=JOIN(2): packed = 1 | (2 << 9)
        buf.write_u16::<LittleEndian>(1 | (2 << 9)).unwrap();
        buf.write_u16::<BigEndian>(0).unwrap();

        assert!(matches!(Header::read(&buf[..]), Err(HeaderError::InvalidVersion(1))));
    }
}
