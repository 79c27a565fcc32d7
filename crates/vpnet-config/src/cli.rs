//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// vpnet command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "vpnet-probe", about = "Drive one universe connection through the socket bridge")]
pub struct CliArgs {
    /// Universe host.
    #[arg(long)]
    pub host: Option<String>,

    /// Universe port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Idle watchdog in seconds (negative disables).
    #[arg(long, allow_hyphen_values = true)]
    pub idle_timeout: Option<i32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Text to send once connected.
    #[arg(long)]
    pub send: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref host) = args.host {
            self.network.host = host.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(seconds) = args.idle_timeout {
            self.network.idle_timeout_seconds = seconds;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
