//! The HTTP/1.0 caching proxy's algorithmic core (component G): a shared,
//! LRU-bounded response cache and the connection handler that forwards,
//! revalidates, and populates it.

pub mod cache;
pub mod handler;

pub use cache::{hash_uri, Cache, CacheEntry, MAX_ENTRIES};
pub use handler::{handle_connection, ProxyContext};
