//! Structured logging for vpnet hosts.
//!
//! Installs a `tracing` subscriber with console output and, in debug builds,
//! a JSON log file for post-mortem analysis of connection lifecycles. The
//! level comes from `RUST_LOG`, then the config's `debug.log_level`, then a
//! built-in default.

use std::fs::File;
use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vpnet_config::Config;

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info,vpnet_bridge=debug";

/// Name of the JSON log file written under `log_dir` in debug builds.
pub const LOG_FILE_NAME: &str = "vpnet.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - Optional directory for the JSON log file (debug builds only)
/// * `debug_build` - Whether file logging is enabled
/// * `config` - Optional configuration supplying the log level
///
/// # Examples
///
/// ```no_run
/// use vpnet_config::Config;
/// use vpnet_log::init_logging;
///
/// let config = Config::default();
/// init_logging(None, false, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for(config)));

    // Connection logs interleave engine and I/O threads, so name them.
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(log_file) = open_log_file(log_dir, debug_build) {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Create (truncating) the JSON log file, or `None` when file logging is off
/// or the directory is unusable.
fn open_log_file(log_dir: Option<&Path>, debug_build: bool) -> Option<File> {
    let log_dir = log_dir.filter(|_| debug_build)?;
    std::fs::create_dir_all(log_dir).ok()?;
    File::create(log_dir.join(LOG_FILE_NAME)).ok()
}

/// Filter directive string for the given config.
pub fn filter_for(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// `EnvFilter` built from [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
