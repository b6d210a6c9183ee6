//! Configuration file support

use edge_chat::{AssemblerConfig, ReadinessConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default backend host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default backend port
pub const DEFAULT_PORT: u16 = 8000;

/// Configuration for edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend host
    pub host: Option<String>,
    /// Backend port
    pub port: Option<u16>,
    /// Seconds between health probes while the backend starts
    pub poll_interval_secs: Option<u64>,
    /// Seconds to wait for the backend before giving up
    pub startup_timeout_secs: Option<u64>,
    /// Prior transcript entries sent with each message
    pub history_turns: Option<usize>,
    /// UI theme ("dark" or "light")
    pub theme: Option<String>,
    /// Whether to use TUI mode by default
    pub tui: Option<bool>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("edge")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("EDGE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`. A missing or broken file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT),
            poll_interval_secs: Some(2),
            startup_timeout_secs: Some(30),
            history_turns: Some(5),
            theme: Some("dark".to_string()),
            tui: Some(true),
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// Record the theme choice, keeping every other setting on disk as it was
    pub fn persist_theme(name: &str) -> std::io::Result<()> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path);
        config.theme = Some(name.to_string());
        config.save_to(&path)
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn readiness(&self) -> ReadinessConfig {
        let defaults = ReadinessConfig::default();
        ReadinessConfig {
            poll_interval: self
                .poll_interval_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            startup_timeout: self
                .startup_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.startup_timeout),
        }
    }

    pub fn assembler(&self) -> AssemblerConfig {
        let defaults = AssemblerConfig::default();
        AssemblerConfig {
            history_turns: self.history_turns.unwrap_or(defaults.history_turns),
            ..defaults
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# edge configuration file
# Place at ~/.config/edge/config.toml (Linux/Mac) or %APPDATA%\edge\config.toml (Windows)

# Backend address
host = "127.0.0.1"
port = 8000

# Health polling while the backend loads its model
poll_interval_secs = 2
startup_timeout_secs = 30

# Prior messages sent as context with each question
history_turns = 5

# UI theme (dark, light). Ctrl+T in the TUI switches and saves it.
theme = "dark"

# Whether to use TUI mode by default (true by default)
# Set to false for simple stdin/stdout mode
tui = true
"#
}
