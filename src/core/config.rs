//! Session configuration, read once at startup

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "SPOTTER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "spotter.json";

/// How synthetic input reaches the target window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Global pointer/keyboard injection; the window must hold focus
    #[default]
    Foreground,
    /// Events delivered straight to the window, focus not required
    Background,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Title pattern of the target window
    pub window_title: String,
    /// Treat `window_title` as a regular expression instead of a
    /// case-insensitive substring
    #[serde(default)]
    pub title_is_regex: bool,
    #[serde(default = "default_template_root")]
    pub template_root: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub input_mode: InputMode,
    /// Where diagnostic snapshots are written
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
}

fn default_template_root() -> PathBuf {
    PathBuf::from("templates")
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_poll_interval_ms() -> u64 {
    300
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Config {
    pub fn new(window_title: impl Into<String>) -> Self {
        Self {
            window_title: window_title.into(),
            title_is_regex: false,
            template_root: default_template_root(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
            input_mode: InputMode::default(),
            snapshot_dir: default_snapshot_dir(),
        }
    }

    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_json(&text)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load the file named by `SPOTTER_CONFIG`, or `spotter.json`
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_title.trim().is_empty() {
            return Err(Error::config("window_title must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("poll_interval_ms must be greater than zero"));
        }
        if self.timeout_ms < self.poll_interval_ms {
            return Err(Error::config(format!(
                "timeout_ms ({}) must not be shorter than poll_interval_ms ({})",
                self.timeout_ms, self.poll_interval_ms
            )));
        }
        if self.title_is_regex {
            regex::Regex::new(&self.window_title)
                .map_err(|e| Error::config(format!("window_title is not a valid regex: {}", e)))?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
