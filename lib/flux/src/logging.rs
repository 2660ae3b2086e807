//! Logging bootstrap shared by every binary in the workspace. Resolves the
//! one standing TODO from the teacher's original sketch: reads a
//! `<logger_config_path>` TOML file when the caller has one, otherwise
//! falls back to a terminal logger at debug level on stderr.

pub use slog::{debug, error, info, o, warn};

use sloggers::{Config, LoggerConfig};
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#;

/// Builds the default terminal logger. Every server binary calls this (or
/// [`init_from_file`]) exactly once in `main`.
pub fn init() -> slog::Logger {
    let config: LoggerConfig =
        serdeconv::from_toml_str(DEFAULT_CONFIG).expect("default logger config is valid TOML");
    config.build_logger().expect("failed building default logger")
}

/// Builds a logger from a TOML config file in the same shape sloggers
/// expects (`type`, `level`, `destination`, ...). Falls back to
/// [`init`] if the file cannot be read, logging nothing about the
/// fallback itself since the logger doesn't exist yet.
pub fn init_from_file<P: AsRef<Path>>(path: P) -> slog::Logger {
    match serdeconv::from_toml_file::<LoggerConfig, _>(path) {
        Ok(config) => config.build_logger().expect("failed building configured logger"),
        Err(_) => init(),
    }
}
