//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "vpnet";
const FILE_NAME: &str = "config.ron";

/// Universe host used when none is configured.
pub const DEFAULT_HOST: &str = "universe.virtualparadise.org";

/// Universe port used when none is configured.
pub const DEFAULT_PORT: u16 = 57000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Connection settings.
    pub network: NetworkConfig,
    /// Async runtime settings.
    pub runtime: RuntimeConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Universe host name or address.
    pub host: String,
    /// Universe port.
    pub port: u16,
    /// Give up on a connect attempt after this many milliseconds (0 = never).
    pub connect_timeout_ms: u64,
    /// Disable Nagle's algorithm on established streams.
    pub nodelay: bool,
    /// Bytes reserved for each socket read.
    pub read_buffer_size: usize,
    /// Idle watchdog in seconds (negative = disabled).
    pub idle_timeout_seconds: i32,
}

/// Async runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads driving socket I/O.
    pub worker_threads: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 10_000,
            nodelay: true,
            read_buffer_size: 16 * 1024,
            idle_timeout_seconds: 30,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { worker_threads: 1 }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Per-user configuration directory, e.g. `~/.config/vpnet` on Linux.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|base| base.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(FILE_NAME);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(FILE_NAME);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
