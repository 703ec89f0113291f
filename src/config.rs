//! Layered configuration for the watch engine.
//!
//! Settings merge, lowest precedence first:
//! - built-in defaults
//! - `.dirwatch/settings.toml`, discovered by walking ancestors of the
//!   current directory
//! - environment variables prefixed `DIRWATCH_`, with double underscores
//!   separating nested levels (`DIRWATCH_WATCHER__MAX_READ_RETRIES=5` sets
//!   `watcher.max_read_retries`)

use std::collections::HashMap;
use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema.
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Knobs for providers and the monitor.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Byte size of the buffer poll-style reads decode from. One read can
    /// carry many records; undersizing it only splits batches.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Consecutive read failures tolerated before a watch fails.
    #[serde(default = "default_max_read_retries")]
    pub max_read_retries: u32,

    /// Base backoff between read retries; grows linearly per attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Capacity of the push-provider event queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Create the watched directory if it does not exist yet.
    #[serde(default = "default_true")]
    pub auto_create: bool,
}

/// Logging configuration: a default level plus per-module overrides.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module levels, e.g. `monitor = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}

fn default_read_buffer_size() -> usize {
    32 * 1024
}

fn default_max_read_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_queue_capacity() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            max_read_retries: default_max_read_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            queue_capacity: default_queue_capacity(),
            auto_create: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".dirwatch/settings.toml"));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("DIRWATCH_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Load configuration from a specific file (plus defaults and env).
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DIRWATCH_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by walking ancestors for a `.dirwatch`
    /// directory.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".dirwatch");
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }
        None
    }

    /// Save the current configuration to a TOML file.
    pub fn save(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Create a default settings file under `.dirwatch/`.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(".dirwatch/settings.toml");
        if !force && config_path.exists() {
            return Err("configuration file already exists, pass force to overwrite".into());
        }
        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
