//! Component A (stream/datagram endpoints) and component B (the connection
//! server core) from the system design.

pub mod endpoint;
pub mod server;

pub use endpoint::{resolve_peer_ip, DatagramEndpoint, StreamEndpoint};
pub use server::{
    ConfigurationError, ConnectionServer, DatagramHandler, DatagramServer, DispatchMode,
    ServerHandle, StreamHandler,
};
