//! Configuration management for the application.
//!
//! Loads, validates, and saves application configuration in TOML format
//! with platform-specific directory resolution.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Path configuration for file system locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PathConfig {
    /// Unix socket the runtime daemon listens on, when not the default.
    pub daemon_socket: Option<PathBuf>,
    /// Directory with the user's profile documents.
    pub profile_dir: Option<PathBuf>,
}

/// Compilation output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Directory compiled runtime documents are written to.
    pub output_dir: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let output_dir = Self::default_output_dir().unwrap_or_else(|_| PathBuf::from(".compiled"));
        Self { output_dir }
    }
}

impl BuildConfig {
    /// The default output directory under the platform config dir.
    fn default_output_dir() -> Result<PathBuf> {
        Ok(Config::config_dir()?.join("compiled"))
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// File system locations.
    #[serde(default)]
    pub paths: PathConfig,
    /// Compilation output settings.
    #[serde(default)]
    pub build: BuildConfig,
}

impl Config {
    /// The platform configuration directory for this application.
    ///
    /// - Linux: `~/.config/stickshift/`
    /// - macOS: `~/Library/Application Support/stickshift/`
    pub fn config_dir() -> Result<PathBuf> {
        let base = dirs::config_dir().context("Could not determine the user config directory")?;
        Ok(base.join(crate::constants::APP_BINARY_NAME))
    }

    /// The configuration file path.
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Loads the configuration, falling back to defaults when the file
    /// does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_file()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Saves the configuration, creating the config directory if needed.
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        let path = Self::config_file()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}
