//! Configuration for the chunk streaming client.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line. Server profiles map a game server address to the auxiliary
//! chunk server that extends it.

mod cli;
mod config;
mod error;

use std::path::PathBuf;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE, Config, DebugConfig, ServerProfile, StreamConfig};
pub use error::ConfigError;

const APP_NAME: &str = "chunkreach";

/// Platform configuration directory for this application, if the OS has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}
