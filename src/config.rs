// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{MonitorError, Result};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Name-resolution configuration.
    #[serde(default)]
    pub names: NamesConfig,
    /// Engine timing configuration.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Store (embedded SQL database) configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { database_path: default_db_path() }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/monitor.db")
}

/// Name-resolution configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct NamesConfig {
    /// Path to the `ip,name` CSV file.
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self { csv_path: default_csv_path() }
    }
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("camera_names.csv")
}

/// Engine timing configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Seconds between ticks of the periodic loop.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Seconds to sleep when no enabled NVRs are configured.
    #[serde(default = "default_empty_sleep_secs")]
    pub empty_sleep_secs: u64,
    /// Seconds to sleep after an unhandled tick error.
    #[serde(default = "default_error_sleep_secs")]
    pub error_sleep_secs: u64,
    /// Per-NVR HTTP poll timeout, in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Per-chat-id Telegram POST timeout, in seconds.
    #[serde(default = "default_telegram_timeout_secs")]
    pub telegram_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            empty_sleep_secs: default_empty_sleep_secs(),
            error_sleep_secs: default_error_sleep_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
            telegram_timeout_secs: default_telegram_timeout_secs(),
        }
    }
}

fn default_tick_secs() -> u64 { 60 }
fn default_empty_sleep_secs() -> u64 { 10 }
fn default_error_sleep_secs() -> u64 { 5 }
fn default_poll_timeout_secs() -> u64 { 6 }
fn default_telegram_timeout_secs() -> u64 { 10 }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("Cannot read config file: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| MonitorError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.tick_secs == 0 {
            return Err(MonitorError::Config("engine.tick_secs must be > 0".into()));
        }
        if self.engine.poll_timeout_secs == 0 {
            return Err(MonitorError::Config("engine.poll_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            names: NamesConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}
