//! Config-loading glue shared by every server binary, in the shape
//! `game/core/src/config.rs` used for `GameConfig`: a `serde`-derived
//! struct with a `Default` impl, loadable from a TOML file on disk.

use serde_derive::{Deserialize, Serialize};
use std::path::Path;

/// Bind/limits shared by every server in this workspace. Individual
/// binaries embed this alongside their own protocol-specific fields
/// (e.g. `max_clients` for chat, `root_dir` for TFTP).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    pub backlog: i32,
    pub accept_timeout_secs: u64,
    pub max_timeouts: u32,
    pub max_clients: usize,
}

impl Default for ServerSettings {
    fn default() -> ServerSettings {
        ServerSettings {
            bind_address: "::".to_string(),
            port: 0,
            backlog: 128,
            accept_timeout_secs: 0,
            max_timeouts: 0,
            max_clients: 256,
        }
    }
}

/// Loads a TOML-serialized config of type `T`, falling back to `T::default()`
/// when no path was given on the command line.
pub fn load_or_default<T>(path: Option<&str>) -> T
where
    T: Default + serde::de::DeserializeOwned,
{
    match path {
        Some(path) if Path::new(path).exists() => {
            serdeconv::from_toml_file(path).expect("error parsing config file")
        }
        _ => T::default(),
    }
}
