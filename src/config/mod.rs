//! Configuration module for cranio
//!
//! This module handles the application configuration: sensor connection,
//! acquisition scheduling, document defaults and the database location.
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/fi.cranio.cranio/`
//! - **macOS**: `~/Library/Application Support/fi.cranio.cranio/`
//! - **Windows**: `%APPDATA%\fi.cranio.cranio\`
//!
//! # Files
//!
//! - `cranio.toml` - Application configuration
//! - `cranio.db` - SQLite database (unless configured elsewhere)
//! - `logs/` - Daily rolling log files
//!
//! # Example
//!
//! ```ignore
//! use cranio::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default();
//! config.apply_env_overrides();
//! config.validate()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{CranioError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "fi.cranio.cranio";

/// Configuration filename
pub const CONFIG_FILE: &str = "cranio.toml";

/// Default database filename
pub const DATABASE_FILE: &str = "cranio.db";

/// Log directory name inside the app data directory
pub const LOG_DIR: &str = "logs";

/// Environment variable that overrides `sensor.enable_dummy_sensor`
pub const ENV_ENABLE_DUMMY_SENSOR: &str = "CRANIO_ENABLE_DUMMY_SENSOR";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        CranioError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            CranioError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== App Config ====================

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configuration from the default location
    pub fn load() -> Result<Self> {
        let path = config_path().ok_or_else(|| {
            CranioError::Config("Could not determine config file path".to_string())
        })?;
        Self::load_from(path)
    }

    /// Load the configuration from a TOML file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CranioError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CranioError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load the configuration, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(CONFIG_FILE))
    }

    /// Save the configuration as TOML
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CranioError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CranioError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            CranioError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_ENABLE_DUMMY_SENSOR) {
            self.apply_dummy_override(&value);
        }
    }

    fn apply_dummy_override(&mut self, value: &str) {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => self.sensor.enable_dummy_sensor = true,
            "0" | "false" | "no" | "off" => self.sensor.enable_dummy_sensor = false,
            other => tracing::warn!(
                "Ignoring {}={:?}: expected a boolean",
                ENV_ENABLE_DUMMY_SENSOR,
                other
            ),
        }
    }

    /// Check the configuration for values the acquisition core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.acquisition.poll_interval_ms == 0 {
            return Err(CranioError::Config(
                "acquisition.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.acquisition.ui_update_interval_ms == 0 {
            return Err(CranioError::Config(
                "acquisition.ui_update_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.sensor.turns_in_full_turn == 0 {
            return Err(CranioError::Config(
                "sensor.turns_in_full_turn must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the database path, using the app data directory by default
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(ensure_app_data_dir()?.join(DATABASE_FILE)),
        }
    }
}
