//! RFC 1350 packet encoding: the five opcodes this server speaks, framed
//! with `byteorder` the same way `sbcp::frame` frames its own header,
//! since TFTP's fields are also fixed-width big-endian integers followed
//! by variable-length or raw payload.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;

pub const MAX_DATA_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Netascii,
    Octet,
}

impl Mode {
    pub fn from_str(s: &str) -> Option<Mode> {
        match s.to_ascii_lowercase().as_str() {
            "netascii" => Some(Mode::Netascii),
            "octet" => Some(Mode::Octet),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Mode::Netascii => "netascii",
            Mode::Octet => "octet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileAlreadyExists,
    NoSuchUser,
}

impl ErrorCode {
    fn to_code(self) -> u16 {
        match self {
            ErrorCode::NotDefined => 0,
            ErrorCode::FileNotFound => 1,
            ErrorCode::AccessViolation => 2,
            ErrorCode::DiskFull => 3,
            ErrorCode::IllegalOperation => 4,
            ErrorCode::UnknownTransferId => 5,
            ErrorCode::FileAlreadyExists => 6,
            ErrorCode::NoSuchUser => 7,
        }
    }

    fn from_code(code: u16) -> ErrorCode {
        match code {
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileAlreadyExists,
            7 => ErrorCode::NoSuchUser,
            _ => ErrorCode::NotDefined,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::NotDefined => "not defined",
            ErrorCode::FileNotFound => "file not found",
            ErrorCode::AccessViolation => "access violation",
            ErrorCode::DiskFull => "disk full or allocation exceeded",
            ErrorCode::IllegalOperation => "illegal TFTP operation",
            ErrorCode::UnknownTransferId => "unknown transfer ID",
            ErrorCode::FileAlreadyExists => "file already exists",
            ErrorCode::NoSuchUser => "no such user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq { filename: String, mode: Mode },
    Wrq { filename: String, mode: Mode },
    Data { block: u16, payload: Vec<u8> },
    Ack { block: u16 },
    Error { code: ErrorCode, message: String },
}

#[derive(Debug)]
pub enum PacketError {
    Truncated,
    UnterminatedField,
    UnknownMode(String),
    UnknownOpcode(u16),
    Io(io::Error),
}

impl std::fmt::Display for PacketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketError::Truncated => write!(f, "packet truncated"),
            PacketError::UnterminatedField => write!(f, "missing NUL terminator in request packet"),
            PacketError::UnknownMode(m) => write!(f, "unknown transfer mode: {}", m),
            PacketError::UnknownOpcode(op) => write!(f, "unknown opcode: {}", op),
            PacketError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for PacketError {}

fn read_cstr(buf: &[u8]) -> Result<(&str, &[u8]), PacketError> {
    let nul = buf.iter().position(|&b| b == 0).ok_or(PacketError::UnterminatedField)?;
    let text = std::str::from_utf8(&buf[..nul]).map_err(|_| PacketError::UnterminatedField)?;
    Ok((text, &buf[nul + 1..]))
}

impl Packet {
    pub fn write<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        match self {
            Packet::Rrq { filename, mode } => {
                writer.write_u16::<BigEndian>(1)?;
                writer.write_all(filename.as_bytes())?;
                writer.write_all(b"\0")?;
                writer.write_all(mode.as_str().as_bytes())?;
                writer.write_all(b"\0")
            }
            Packet::Wrq { filename, mode } => {
                writer.write_u16::<BigEndian>(2)?;
                writer.write_all(filename.as_bytes())?;
                writer.write_all(b"\0")?;
                writer.write_all(mode.as_str().as_bytes())?;
                writer.write_all(b"\0")
            }
            Packet::Data { block, payload } => {
                writer.write_u16::<BigEndian>(3)?;
                writer.write_u16::<BigEndian>(*block)?;
                writer.write_all(payload)
            }
            Packet::Ack { block } => {
                writer.write_u16::<BigEndian>(4)?;
                writer.write_u16::<BigEndian>(*block)
            }
            Packet::Error { code, message } => {
                writer.write_u16::<BigEndian>(5)?;
                writer.write_u16::<BigEndian>(code.to_code())?;
                writer.write_all(message.as_bytes())?;
                writer.write_all(b"\0")
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("writing to a Vec never fails");
        buf
    }

    pub fn parse(buf: &[u8]) -> Result<Packet, PacketError> {
        if buf.len() < 2 {
            return Err(PacketError::Truncated);
        }
        let mut cursor = &buf[..2];
        let opcode = cursor.read_u16::<BigEndian>().map_err(PacketError::Io)?;
        let rest = &buf[2..];

        match opcode {
            1 | 2 => {
                let (filename, rest) = read_cstr(rest)?;
                let (mode_str, _) = read_cstr(rest)?;
                let mode = Mode::from_str(mode_str).ok_or_else(|| PacketError::UnknownMode(mode_str.to_string()))?;
                let filename = filename.to_string();
                Ok(if opcode == 1 {
                    Packet::Rrq { filename, mode }
                } else {
                    Packet::Wrq { filename, mode }
                })
            }
            3 => {
                if rest.len() < 2 {
                    return Err(PacketError::Truncated);
                }
                let mut block_cursor = &rest[..2];
                let block = block_cursor.read_u16::<BigEndian>().map_err(PacketError::Io)?;
                Ok(Packet::Data {
                    block,
                    payload: rest[2..].to_vec(),
                })
            }
            4 => {
                if rest.len() < 2 {
                    return Err(PacketError::Truncated);
                }
                let mut block_cursor = &rest[..2];
                let block = block_cursor.read_u16::<BigEndian>().map_err(PacketError::Io)?;
                Ok(Packet::Ack { block })
            }
            5 => {
                if rest.len() < 2 {
                    return Err(PacketError::Truncated);
                }
                let mut code_cursor = &rest[..2];
                let code = code_cursor.read_u16::<BigEndian>().map_err(PacketError::Io)?;
                let (message, _) = read_cstr(&rest[2..])?;
                Ok(Packet::Error {
                    code: ErrorCode::from_code(code),
                    message: message.to_string(),
                })
            }
            other => Err(PacketError::UnknownOpcode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrq_round_trips() {
        let pkt = Packet::Rrq {
            filename: "foo.txt".to_string(),
            mode: Mode::Octet,
        };
        let encoded = pkt.encode();
        assert_eq!(Packet::parse(&encoded).unwrap(), pkt);
    }

    #[test]
    fn data_round_trips_with_payload() {
        let pkt = Packet::Data {
            block: 7,
            payload: vec![1, 2, 3, 4],
        };
        let encoded = pkt.encode();
        assert_eq!(Packet::parse(&encoded).unwrap(), pkt);
    }

    #[test]
    fn error_round_trips() {
        let pkt = Packet::Error {
            code: ErrorCode::FileNotFound,
            message: ErrorCode::FileNotFound.message().to_string(),
        };
        let encoded = pkt.encode();
        assert_eq!(Packet::parse(&encoded).unwrap(), pkt);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(1).unwrap();
        buf.extend(b"file\0mail\0");
        assert!(matches!(Packet::parse(&buf), Err(PacketError::UnknownMode(_))));
    }
}
