//! Component C: the Simple Broadcast Chat Protocol wire codec. A fixed
//! 4-byte header (`version:9 | type:7 | length:16`) followed by a run of
//! `type:16 | length:16 | value` attributes, framed the way the teacher's
//! `net::frame` module frames its own control/payload categories
//! (`byteorder` read/write on a `&mut [u8]`/`&[u8]` cursor) but with SBCP's
//! own header layout and attribute table instead of the game protocol's.

pub mod attribute;
pub mod frame;
pub mod message;

pub use attribute::{Attribute, AttributeType};
pub use frame::{Header, MessageType};
pub use message::{Message, MessageError};
