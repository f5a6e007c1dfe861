//! Configuration management for blockflow-rs
//!
//! This module provides:
//! - `AppConfig`: runtime settings loaded from TOML (scheduler, sources, buffers, logging)
//! - `NetworkFile`: a persisted network (graph plus data sources) stored as JSON
//!
//! # App Data Location
//!
//! The application configuration is stored in the platform-specific data directory:
//! - Linux: `~/.local/share/dev.blockflow.blockflow-rs/blockflow.toml`
//! - macOS: `~/Library/Application Support/dev.blockflow.blockflow-rs/blockflow.toml`
//! - Windows: `%APPDATA%\dev.blockflow.blockflow-rs\blockflow.toml`
//!
//! # Example
//!
//! ```ignore
//! use blockflow_rs::config::AppConfig;
//!
//! let config = AppConfig::load_or_default();
//! println!("Tick interval: {} ms", config.scheduler.interval_ms);
//! ```

pub mod network;

pub use network::{NetworkFile, NETWORK_FILE_VERSION};

use crate::error::{BlockFlowError, Result};
use crate::graph::DEFAULT_HISTORY_CAPACITY;
use crate::types::{DEFAULT_MAX_HISTORY, DEFAULT_MAX_POINTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for the app data directory
pub const APP_ID: &str = "dev.blockflow.blockflow-rs";

/// Config file name within the app data directory
pub const CONFIG_FILE: &str = "blockflow.toml";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        BlockFlowError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            BlockFlowError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the default config file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Sections ====================

/// Tick loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick period in milliseconds
    pub interval_ms: u64,

    /// Passed to the engine's `execute()` on every tick
    pub learning_enabled: bool,

    /// Skip (rather than replay) ticks missed while a tick overran its period
    pub skip_missed_ticks: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            learning_enabled: true,
            skip_missed_ticks: true,
        }
    }
}

fn default_interval_ms() -> u64 {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// History length for sources that do not set `maxHistory`
    pub max_history: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    /// Samples kept per node time series
    pub max_points: usize,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Undo entries kept before the oldest is evicted
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: Option<String>,

    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

// ==================== AppConfig ====================

/// Runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub sources: SourcesConfig,
    pub visualization: VisualizationConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BlockFlowError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            BlockFlowError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load the config from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BlockFlowError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| BlockFlowError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            BlockFlowError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Save the config to the default location
    pub fn save_default(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save(dir.join(CONFIG_FILE))
    }
}
