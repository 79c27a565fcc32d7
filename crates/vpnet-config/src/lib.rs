//! Configuration for vpnet hosts.
//!
//! Settings persist to disk as RON and can be overridden from the command
//! line via clap. Every section defaults field-by-field, so older or partial
//! files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DEFAULT_HOST, DEFAULT_PORT, DebugConfig, NetworkConfig, RuntimeConfig};
pub use error::ConfigError;
