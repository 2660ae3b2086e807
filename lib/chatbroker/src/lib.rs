//! Component D: the multi-client chat broker built on top of `netcore`'s
//! connection server and `sbcp`'s wire codec. A single central task owns
//! the username registry; one worker thread per session bridges its TCP
//! endpoint to that task over a pair of `std::sync::mpsc` channels (see
//! SPEC_FULL.md §4.D for why channels replace the reference
//! implementation's named pipes).

pub mod registry;
pub mod session;
pub mod wire;

pub use registry::{ChatBroker, SessionId, ToCentral};
pub use session::{handle_connection, ChatServerContext};
pub use wire::{read_message, write_message};
