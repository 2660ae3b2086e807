//! Whole SBCP messages: a `Header` plus the attributes its message type
//! requires, validated against the table in §4.C.

use crate::attribute::{Attribute, AttributeError, AttributeIter, AttributeType};
use crate::frame::{Header, HeaderError, MessageType, MAX_PAYLOAD_LEN};
use std::io;

#[derive(Debug)]
pub enum MessageError {
    Header(HeaderError),
    Attribute(AttributeError),
    PayloadTooLarge { max: usize, actual: usize },
    MissingAttribute { message_type: MessageType, attribute: AttributeType },
    UnexpectedAttribute { message_type: MessageType, attribute: AttributeType },
    DuplicateAttribute { message_type: MessageType, attribute: AttributeType },
    TrailingBytes,
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageError::Header(err) => write!(f, "{}", err),
            MessageError::Attribute(err) => write!(f, "{}", err),
            MessageError::PayloadTooLarge { max, actual } => {
                write!(f, "payload too large: {} > {}", actual, max)
            }
            MessageError::MissingAttribute { message_type, attribute } => {
                write!(f, "{:?} message is missing required {:?} attribute", message_type, attribute)
            }
            MessageError::UnexpectedAttribute { message_type, attribute } => {
                write!(f, "{:?} message carries unexpected {:?} attribute", message_type, attribute)
            }
            MessageError::DuplicateAttribute { message_type, attribute } => {
                write!(f, "{:?} message carries {:?} more than once", message_type, attribute)
            }
            MessageError::TrailingBytes => write!(f, "trailing bytes after last attribute"),
        }
    }
}

impl std::error::Error for MessageError {}

impl From<HeaderError> for MessageError {
    fn from(err: HeaderError) -> Self {
        MessageError::Header(err)
    }
}

impl From<AttributeError> for MessageError {
    fn from(err: AttributeError) -> Self {
        MessageError::Attribute(err)
    }
}

/// A fully decoded, validated SBCP message.
#[derive(Debug, Clone)]
pub struct Message {
    pub message_type: MessageType,
    attributes: Vec<Attribute>,
}

impl Message {
    pub fn join(username: &str) -> Message {
        Message {
            message_type: MessageType::Join,
            attributes: vec![Attribute::text(AttributeType::Username, username)],
        }
    }

    pub fn send(text: &str) -> Message {
        Message {
            message_type: MessageType::Send,
            attributes: vec![Attribute::text(AttributeType::Message, text)],
        }
    }

    pub fn fwd(username: &str, text: &str) -> Message {
        Message {
            message_type: MessageType::Fwd,
            attributes: vec![
                Attribute::text(AttributeType::Username, username),
                Attribute::text(AttributeType::Message, text),
            ],
        }
    }

    pub fn ack(usernames: &[String]) -> Message {
        let mut attributes = Vec::with_capacity(1 + usernames.len());
        attributes.push(Attribute::client_count(usernames.len() as u16 + 1));
        attributes.extend(usernames.iter().map(|u| Attribute::text(AttributeType::Username, u)));
        Message {
            message_type: MessageType::Ack,
            attributes,
        }
    }

    pub fn nak(reason: &str) -> Message {
        Message {
            message_type: MessageType::Nak,
            attributes: vec![Attribute::text(AttributeType::Reason, reason)],
        }
    }

    pub fn online(username: &str) -> Message {
        Message {
            message_type: MessageType::Online,
            attributes: vec![Attribute::text(AttributeType::Username, username)],
        }
    }

    pub fn offline(username: &str) -> Message {
        Message {
            message_type: MessageType::Offline,
            attributes: vec![Attribute::text(AttributeType::Username, username)],
        }
    }

    pub fn idle(username: Option<&str>) -> Message {
        Message {
            message_type: MessageType::Idle,
            attributes: username
                .map(|u| vec![Attribute::text(AttributeType::Username, u)])
                .unwrap_or_default(),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Convenience accessor for messages carrying exactly one USERNAME
    /// (JOIN, ONLINE, OFFLINE, and optionally IDLE).
    pub fn username(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type() == AttributeType::Username)
            .and_then(|a| a.as_text().ok())
    }

    pub fn text(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type() == AttributeType::Message)
            .and_then(|a| a.as_text().ok())
    }

    pub fn reason(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type() == AttributeType::Reason)
            .and_then(|a| a.as_text().ok())
    }

    pub fn client_count(&self) -> Option<u16> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type() == AttributeType::ClientCount)
            .and_then(|a| a.as_client_count().ok())
    }

    fn payload_len(&self) -> usize {
        self.attributes.iter().map(Attribute::size).sum()
    }

    pub fn write<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        let header = Header {
            message_type: self.message_type,
            length: self.payload_len() as u16,
        };
        header.write(&mut writer)?;
        for attribute in &self.attributes {
            attribute.write(&mut writer)?;
        }
        Ok(())
    }

    /// Reads a header followed by its payload from `reader`, then parses
    /// and validates the attribute stream against the per-type table.
    pub fn read<R: io::Read>(mut reader: R) -> Result<Message, MessageError> {
        let header = Header::read(&mut reader)?;

        if header.length as usize > MAX_PAYLOAD_LEN {
            return Err(MessageError::PayloadTooLarge {
                max: MAX_PAYLOAD_LEN,
                actual: header.length as usize,
            });
        }

        let mut payload = vec![0u8; header.length as usize];
        reader.read_exact(&mut payload).map_err(HeaderError::Io)?;

        let mut attributes = Vec::new();
        for attribute in AttributeIter::new(&payload) {
            attributes.push(attribute?);
        }

        let message = Message {
            message_type: header.message_type,
            attributes,
        };
        message.validate()?;
        Ok(message)
    }

    /// Checks the decoded attribute set against §4.C's per-type cardinality
    /// table. Constructors above always build valid messages; this guards
    /// messages arriving off the wire.
    fn validate(&self) -> Result<(), MessageError> {
        let counts = |t: AttributeType| self.attributes.iter().filter(|a| a.attribute_type() == t).count();
        let require_exactly_one = |t: AttributeType| -> Result<(), MessageError> {
            match counts(t) {
                0 => Err(MessageError::MissingAttribute { message_type: self.message_type, attribute: t }),
                1 => Ok(()),
                _ => Err(MessageError::DuplicateAttribute { message_type: self.message_type, attribute: t }),
            }
        };
        let forbid_others = |allowed: &[AttributeType]| -> Result<(), MessageError> {
            for attribute in &self.attributes {
                if !allowed.contains(&attribute.attribute_type()) {
                    return Err(MessageError::UnexpectedAttribute {
                        message_type: self.message_type,
                        attribute: attribute.attribute_type(),
                    });
                }
            }
            Ok(())
        };

        match self.message_type {
            MessageType::Join | MessageType::Online | MessageType::Offline => {
                require_exactly_one(AttributeType::Username)?;
                forbid_others(&[AttributeType::Username])?;
            }
            MessageType::Send => {
                require_exactly_one(AttributeType::Message)?;
                forbid_others(&[AttributeType::Message])?;
            }
            MessageType::Fwd => {
                require_exactly_one(AttributeType::Username)?;
                require_exactly_one(AttributeType::Message)?;
                forbid_others(&[AttributeType::Username, AttributeType::Message])?;
            }
            MessageType::Idle => {
                if counts(AttributeType::Username) > 1 {
                    return Err(MessageError::DuplicateAttribute {
                        message_type: self.message_type,
                        attribute: AttributeType::Username,
                    });
                }
                forbid_others(&[AttributeType::Username])?;
            }
            MessageType::Nak => {
                require_exactly_one(AttributeType::Reason)?;
                forbid_others(&[AttributeType::Reason])?;
            }
            MessageType::Ack => {
                require_exactly_one(AttributeType::ClientCount)?;
                forbid_others(&[AttributeType::ClientCount, AttributeType::Username])?;

                let expected = self.client_count().unwrap_or(0) as usize;
                let actual_usernames = counts(AttributeType::Username) + 1;
                if expected != actual_usernames {
                    return Err(MessageError::MissingAttribute {
                        message_type: self.message_type,
                        attribute: AttributeType::Username,
                    });
                }
                if self.attributes.first().map(Attribute::attribute_type) != Some(AttributeType::ClientCount) {
                    return Err(MessageError::UnexpectedAttribute {
                        message_type: self.message_type,
                        attribute: AttributeType::ClientCount,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_round_trips() {
        let msg = Message::join("alice");
        let mut buf = Vec::new();
        msg.write(&mut buf).unwrap();

        let decoded = Message::read(&buf[..]).unwrap();
        assert_eq!(decoded.message_type, MessageType::Join);
        assert_eq!(decoded.username(), Some("alice"));
    }

    #[test]
    fn fwd_round_trips_both_attributes() {
        let msg = Message::fwd("bob", "hello there");
        let mut buf = Vec::new();
        msg.write(&mut buf).unwrap();

        let decoded = Message::read(&buf[..]).unwrap();
        assert_eq!(decoded.username(), Some("bob"));
        assert_eq!(decoded.text(), Some("hello there"));
    }

    #[test]
    fn ack_round_trips_client_count_and_usernames() {
        let msg = Message::ack(&["bob".to_string(), "carol".to_string()]);
        let mut buf = Vec::new();
        msg.write(&mut buf).unwrap();

        let decoded = Message::read(&buf[..]).unwrap();
        assert_eq!(decoded.client_count(), Some(3));
    }

    #[test]
    fn send_without_message_attribute_is_rejected() {
        let mut buf = Vec::new();
        let header = Header {
            message_type: MessageType::Send,
            length: 0,
        };
        header.write(&mut buf).unwrap();

        assert!(matches!(
            Message::read(&buf[..]),
            Err(MessageError::MissingAttribute { message_type: MessageType::Send, .. })
        ));
    }

    #[test]
    fn idle_with_no_username_is_valid() {
        let msg = Message::idle(None);
        let mut buf = Vec::new();
        msg.write(&mut buf).unwrap();

        let decoded = Message::read(&buf[..]).unwrap();
        assert_eq!(decoded.username(), None);
    }
}
