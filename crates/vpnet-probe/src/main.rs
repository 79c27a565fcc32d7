//! Probe host for the socket bridge.
//!
//! Plays the engine's role for one connection: creates it, connects to the
//! configured universe, prints whatever arrives, and exits on disconnect,
//! connect failure, or idle timeout.
//!
//! Run with: `cargo run -p vpnet-probe -- --host 127.0.0.1 --port 6000`

mod session;

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use vpnet_bridge::{Bridge, BridgeSettings, Handle, NetDriver, Notification, NotifyKind};
use vpnet_config::{CliArgs, Config, ConfigError};

use crate::session::{Flow, Session};

/// How long one `wait` may block the host loop.
const WAIT_SLICE: Duration = Duration::from_millis(250);

fn main() {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone().map_or_else(Config::default_dir, Ok) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to resolve config directory: {e}");
            std::process::exit(1);
        }
    };
    // Nothing is installed to log through yet; report the outcome below.
    let (config, load_error) = load_config(&config_dir, &args);

    vpnet_log::init_logging(
        Some(&config_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );
    match load_error {
        None => info!("Config loaded from {}", config_dir.display()),
        Some(e) => tracing::warn!("Using default config: {e}"),
    }

    let mut bridge = match Bridge::new(bridge_settings(&config)) {
        Ok(bridge) => bridge,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let payload = args.send.map(String::into_bytes);
    let code = run(&mut bridge, &config, payload);
    drop(bridge);
    std::process::exit(code);
}

/// Load (or create) the config and apply CLI overrides. A config that
/// cannot be loaded falls back to defaults and the error is handed back for
/// logging once a subscriber exists.
fn load_config(config_dir: &Path, args: &CliArgs) -> (Config, Option<ConfigError>) {
    let (mut config, error) = match Config::load_or_create(config_dir) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    config.apply_cli_overrides(args);
    (config, error)
}

/// Translate persisted config into bridge settings.
fn bridge_settings(config: &Config) -> BridgeSettings {
    let network = &config.network;
    BridgeSettings {
        connect_timeout: (network.connect_timeout_ms > 0)
            .then(|| Duration::from_millis(network.connect_timeout_ms)),
        nodelay: network.nodelay,
        read_buffer_size: network.read_buffer_size,
        worker_threads: config.runtime.worker_threads,
    }
}

/// Host loop: wait for notifications, then react to them outside the bridge
/// call that delivered them.
fn run(bridge: &mut Bridge, config: &Config, payload: Option<Vec<u8>>) -> i32 {
    let network = &config.network;
    let handle = NetDriver::create(bridge);
    info!("Connecting to {}:{}", network.host, network.port);
    let rc = NetDriver::connect(bridge, handle, &network.host, network.port);
    if rc != 0 {
        tracing::error!("Connect rejected with code {rc}");
        return 1;
    }

    let mut session = Session::new(handle, network.idle_timeout_seconds, payload);
    let mut inbox = VecDeque::new();
    loop {
        bridge.wait(
            &mut |handle: Handle, kind: NotifyKind, code: i32| {
                inbox.push_back(Notification { handle, kind, code });
            },
            WAIT_SLICE,
        );
        while let Some(notification) = inbox.pop_front() {
            tracing::debug!(
                "Notify {} on {}: {}",
                notification.kind,
                notification.handle,
                notification.code
            );
            if let Flow::Exit(code) = session.on_notify(bridge, notification) {
                NetDriver::destroy(bridge, handle);
                return code;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_settings_from_config() {
        let mut config = Config::default();
        config.network.connect_timeout_ms = 2500;
        config.network.nodelay = false;
        config.runtime.worker_threads = 3;
        let settings = bridge_settings(&config);
        assert_eq!(settings.connect_timeout, Some(Duration::from_millis(2500)));
        assert!(!settings.nodelay);
        assert_eq!(settings.worker_threads, 3);
        assert_eq!(settings.read_buffer_size, config.network.read_buffer_size);
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let args = CliArgs {
            port: Some(6000),
            ..CliArgs::default()
        };
        let (config, error) = load_config(dir.path(), &args);
        assert!(error.is_none());
        assert_eq!(config.network.port, 6000);
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_load_config_falls_back_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "(network: (port: \"x\"))").unwrap();
        let (config, error) = load_config(dir.path(), &CliArgs::default());
        assert!(matches!(error, Some(ConfigError::ParseError(_))));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_zero_connect_timeout_disables_limit() {
        let mut config = Config::default();
        config.network.connect_timeout_ms = 0;
        assert_eq!(bridge_settings(&config).connect_timeout, None);
    }

    #[test]
    fn test_run_against_closing_peer() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let peer = std::thread::spawn(move || {
            use std::io::Write;
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"welcome").unwrap();
        });

        let mut config = Config::default();
        config.network.host = "127.0.0.1".to_string();
        config.network.port = port;
        config.network.idle_timeout_seconds = 5;
        let mut bridge = Bridge::new(bridge_settings(&config)).unwrap();

        assert_eq!(run(&mut bridge, &config, None), 0);
        assert_eq!(bridge.connection_count(), 0);
        peer.join().unwrap();
    }
}
