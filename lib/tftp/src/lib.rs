//! RFC 1350 TFTP server (component C): packet codec, netascii transform,
//! per-transfer RRQ/WRQ handlers, and the top-level request dispatcher.

pub mod dispatch;
pub mod netascii;
pub mod packet;
pub mod server;

pub use dispatch::{handle_request, TftpContext};
pub use packet::{ErrorCode, Mode, Packet, PacketError, MAX_DATA_LEN};
pub use server::{handle_rrq, handle_wrq, MAX_RETRIES, TIMEOUT};
