// In: src/config.rs

//! The single source of truth for timeline service configuration.
//!
//! `TimelineConfig` is created once at the application boundary (usually from a
//! JSON file) and then shared read-only as an `Arc<TimelineConfig>`. Every field
//! has a serde default, so an empty object `{}` is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TimelineError};

//==================================================================================
// I. Logging
//==================================================================================

/// Settings consumed by `logging::init_logging`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LogConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace` (case-insensitive).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// When set, log lines are appended to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        self.level.parse::<log::LevelFilter>().map_err(|_| {
            TimelineError::InvalidConfig(format!("unknown log level '{}'", self.level))
        })
    }
}

//==================================================================================
// II. The Unified TimelineConfig
//==================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimelineConfig {
    /// Length of the storage window each blob covers, in seconds. Window starts
    /// are aligned to multiples of this length since the unix epoch.
    #[serde(default = "default_window_secs")]
    pub window_secs: u32,

    /// If true, every blob is decoded and compared against its input before it
    /// is handed to the store.
    #[serde(default = "default_true")]
    pub verify_on_write: bool,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            verify_on_write: true,
            log: LogConfig::default(),
        }
    }
}

impl TimelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TimelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loading timeline config from {}", path.as_ref().display());
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 {
            return Err(TimelineError::InvalidConfig(
                "window_secs must be positive".to_string(),
            ));
        }
        self.log.level_filter()?;
        Ok(())
    }
}

/// Helper for `serde` to default a boolean field to true.
fn default_true() -> bool {
    true
}

fn default_window_secs() -> u32 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}
