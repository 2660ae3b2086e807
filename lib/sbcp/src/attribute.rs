//! SBCP attributes: `type:16 | length:16 | value[length]`, network byte
//! order throughout (distinct from the header's packed bitfield, see
//! `frame.rs`).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;

pub const USERNAME_MAX: usize = 16;
pub const MESSAGE_MAX: usize = 512;
pub const REASON_MAX: usize = 32;
pub const CLIENT_COUNT_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Reason,
    Username,
    ClientCount,
    Message,
}

impl AttributeType {
    fn to_code(self) -> u16 {
        match self {
            AttributeType::Reason => 1,
            AttributeType::Username => 2,
            AttributeType::ClientCount => 3,
            AttributeType::Message => 4,
        }
    }

    fn from_code(code: u16) -> Option<AttributeType> {
        Some(match code {
            1 => AttributeType::Reason,
            2 => AttributeType::Username,
            3 => AttributeType::ClientCount,
            4 => AttributeType::Message,
            _ => return None,
        })
    }

    pub fn max_len(self) -> usize {
        match self {
            AttributeType::Reason => REASON_MAX,
            AttributeType::Username => USERNAME_MAX,
            AttributeType::ClientCount => CLIENT_COUNT_LEN,
            AttributeType::Message => MESSAGE_MAX,
        }
    }
}

/// A single decoded attribute. `value` is the raw, already-length-validated
/// payload bytes; typed accessors interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    attribute_type: AttributeType,
    value: Vec<u8>,
}

#[derive(Debug)]
pub enum AttributeError {
    PayloadTooLarge { attribute: AttributeType, max: usize, actual: usize },
    WrongLength { attribute: AttributeType, expected: usize, actual: usize },
    UnknownType(u16),
    NotUtf8,
    Io(io::Error),
}

impl std::fmt::Display for AttributeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeError::PayloadTooLarge { attribute, max, actual } => {
                write!(f, "{:?} payload too large: {} > {}", attribute, actual, max)
            }
            AttributeError::WrongLength { attribute, expected, actual } => {
                write!(f, "{:?} has wrong length: expected {}, got {}", attribute, expected, actual)
            }
            AttributeError::UnknownType(code) => write!(f, "unknown attribute type: {}", code),
            AttributeError::NotUtf8 => write!(f, "attribute value is not valid utf-8"),
            AttributeError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for AttributeError {}

impl Attribute {
    /// Constructs a username/message/reason attribute, clamping the input
    /// to the attribute's maximum length (per §4.C's "constructors clamp
    /// input to the per-attribute maximum").
    pub fn text(attribute_type: AttributeType, text: &str) -> Attribute {
        debug_assert_ne!(attribute_type, AttributeType::ClientCount);
        let max = attribute_type.max_len();
        let cut = if text.len() <= max {
            text.len()
        } else {
            (0..=max).rfind(|&i| text.is_char_boundary(i)).unwrap_or(0)
        };
        Attribute {
            attribute_type,
            value: text.as_bytes()[..cut].to_vec(),
        }
    }

    pub fn client_count(count: u16) -> Attribute {
        let mut value = Vec::with_capacity(CLIENT_COUNT_LEN);
        value.write_u16::<BigEndian>(count).expect("writing to a Vec never fails");
        Attribute {
            attribute_type: AttributeType::ClientCount,
            value,
        }
    }

    #[inline]
    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    /// Total on-wire size: 2 (type) + 2 (length) + value length.
    #[inline]
    pub fn size(&self) -> usize {
        4 + self.value.len()
    }

    pub fn as_text(&self) -> Result<&str, AttributeError> {
        std::str::from_utf8(&self.value).map_err(|_| AttributeError::NotUtf8)
    }

    pub fn as_client_count(&self) -> Result<u16, AttributeError> {
        if self.value.len() != CLIENT_COUNT_LEN {
            return Err(AttributeError::WrongLength {
                attribute: AttributeType::ClientCount,
                expected: CLIENT_COUNT_LEN,
                actual: self.value.len(),
            });
        }
        Ok((&self.value[..]).read_u16::<BigEndian>().expect("length checked above"))
    }

    pub fn write<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u16::<BigEndian>(self.attribute_type.to_code())?;
        writer.write_u16::<BigEndian>(self.value.len() as u16)?;
        writer.write_all(&self.value)
    }

    /// Parses one attribute starting at `buf[0]`, returning it along with
    /// the number of bytes consumed. Validates the typed length bound as it
    /// advances, per §4.C's "lazily validates" requirement.
    fn parse(buf: &[u8]) -> Result<(Attribute, usize), AttributeError> {
        let mut cursor = buf;
        let type_code = cursor.read_u16::<BigEndian>().map_err(AttributeError::Io)?;
        let attribute_type = AttributeType::from_code(type_code).ok_or(AttributeError::UnknownType(type_code))?;
        let length = cursor.read_u16::<BigEndian>().map_err(AttributeError::Io)? as usize;

        if length > attribute_type.max_len() {
            return Err(AttributeError::PayloadTooLarge {
                attribute: attribute_type,
                max: attribute_type.max_len(),
                actual: length,
            });
        }

        if cursor.len() < length {
            return Err(AttributeError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
        }

        let value = cursor[..length].to_vec();
        Ok((
            Attribute {
                attribute_type,
                value,
            },
            4 + length,
        ))
    }
}

/// A streaming, lazily-validating iterator over the attributes packed in a
/// message's payload bytes.
pub struct AttributeIter<'a> {
    remaining: &'a [u8],
}

impl<'a> AttributeIter<'a> {
    pub fn new(payload: &'a [u8]) -> AttributeIter<'a> {
        AttributeIter { remaining: payload }
    }
}

impl<'a> Iterator for AttributeIter<'a> {
    type Item = Result<Attribute, AttributeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        match Attribute::parse(self.remaining) {
            Ok((attribute, consumed)) => {
                self.remaining = &self.remaining[consumed..];
                Some(Ok(attribute))
            }
            Err(err) => {
                self.remaining = &[];
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_clamps_to_max() {
        let attr = Attribute::text(AttributeType::Username, &"x".repeat(100));
        assert_eq!(attr.value.len(), USERNAME_MAX);
    }

    #[test]
    fn client_count_round_trips() {
        let attr = Attribute::client_count(42);
        assert_eq!(attr.as_client_count().unwrap(), 42);
    }

    #[test]
    fn iter_rejects_oversized_attribute() {
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(AttributeType::Username.to_code()).unwrap();
        buf.write_u16::<BigEndian>(200).unwrap();
        buf.extend(std::iter::repeat(b'a').take(200));

        let mut iter = AttributeIter::new(&buf);
        assert!(matches!(iter.next(), Some(Err(AttributeError::PayloadTooLarge { .. }))));
    }
}
