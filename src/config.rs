//! Configuration management for runconsole.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.runconsole/config.toml`
//! - The [`TabSettings`] provider the console model reads on every TAB
//!
//! # Configuration File
//!
//! ```toml
//! # Scrollback cap (oldest lines are evicted beyond this)
//! max_lines = 10000
//!
//! # trace, debug, info, warn, error
//! log_level = "info"
//!
//! [tabs]
//! use_spaces = false
//! spaces_per_tab = 4
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default scrollback cap
pub const DEFAULT_MAX_LINES: usize = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config path")]
    NoHomeDir,
}

/// Settings read by the console model whenever it sees a TAB
pub trait TabSettings: Send + Sync {
    /// Expand tabs to spaces instead of storing a literal `\t`
    fn use_spaces_for_tabs(&self) -> bool;
    /// Tab stop width when expanding
    fn spaces_per_tab(&self) -> usize;
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of retained lines
    pub max_lines: usize,
    /// Log level for the file logger
    pub log_level: String,
    /// Tab handling
    pub tabs: TabConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            log_level: "info".to_string(),
            tabs: TabConfig::default(),
        }
    }
}

/// Tab configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabConfig {
    pub use_spaces: bool,
    pub spaces_per_tab: usize,
}

impl Default for TabConfig {
    fn default() -> Self {
        Self {
            use_spaces: false,
            spaces_per_tab: 4,
        }
    }
}

impl TabSettings for TabConfig {
    fn use_spaces_for_tabs(&self) -> bool {
        self.use_spaces
    }

    fn spaces_per_tab(&self) -> usize {
        self.spaces_per_tab
    }
}

impl TabSettings for Config {
    fn use_spaces_for_tabs(&self) -> bool {
        self.tabs.use_spaces_for_tabs()
    }

    fn spaces_per_tab(&self) -> usize {
        self.tabs.spaces_per_tab()
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring config: {}", e),
                }
            }
        }
        Self::default()
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::get_config_path().ok_or(ConfigError::NoHomeDir)?;
        self.save_to(&path)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory holding the config file and the log
    pub fn app_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".runconsole"))
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        let dir = Self::app_dir()?;
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir.join("config.toml"))
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[tabs]\nuse_spaces = true\n").unwrap();
        assert!(config.use_spaces_for_tabs());
        assert_eq!(config.spaces_per_tab(), 4);
        assert_eq!(config.max_lines, DEFAULT_MAX_LINES);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            max_lines: 250,
            log_level: "debug".to_string(),
            tabs: TabConfig {
                use_spaces: true,
                spaces_per_tab: 8,
            },
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load_from(&missing),
            Err(ConfigError::Io { .. })
        ));

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "max_lines = \"lots\"").unwrap();
        assert!(matches!(
            Config::load_from(&broken),
            Err(ConfigError::Parse(_))
        ));
    }
}
