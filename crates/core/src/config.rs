//! Client configuration
//!
//! Loaded from `outpost.toml`, either at an explicit path or in the
//! platform config directory. Every section and field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "outpost.toml";

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerSection,
    pub client: ClientSection,
    pub log: LogSection,
}

/// Remote endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Fixed request path of the socket endpoint
    pub path: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            path: "/socket".to_string(),
        }
    }
}

/// Consumer loop and session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// Name sent in the handshake
    pub username: String,
    /// Consumer loop period in milliseconds
    pub tick_interval_ms: u64,
    /// Backlog size at which the packet queue logs a warning
    pub queue_warn_threshold: usize,
    /// Hold incoming packets this long before dispatch (debugging aid)
    pub simulated_latency_ms: Option<u64>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            username: "player".to_string(),
            tick_interval_ms: 16,
            queue_warn_threshold: 1024,
            simulated_latency_ms: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Default `tracing` filter directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `path` if given, else from the platform config directory.
    ///
    /// A missing file in the platform directory yields the defaults; a
    /// missing explicit path is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Self::default_path()?;
        if !default_path.exists() {
            tracing::debug!(path = %default_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        Self::load(&default_path)
    }

    /// Path of the config file in the platform config directory
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "outpost", "outpost").ok_or(Error::NoConfigDir)?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Consumer loop period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.client.tick_interval_ms)
    }

    /// Simulated dispatch latency, if enabled
    pub fn simulated_latency(&self) -> Option<Duration> {
        self.client
            .simulated_latency_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::InvalidConfig("server.host cannot be empty".into()));
        }
        if self.server.port == 0 {
            return Err(Error::InvalidConfig("server.port cannot be 0".into()));
        }
        if !self.server.path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "server.path must start with '/': '{}'",
                self.server.path
            )));
        }
        if self.client.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "client.tick_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
