use crate::error::Result;
use crate::ledger::Direction;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Transfer limits for one traffic direction. A value at or below zero
/// disables that limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionLimits {
    /// Speed limit in bytes per second
    #[serde(default = "unlimited")]
    pub speed_limit: i64,

    /// Volume limit in bytes
    #[serde(default = "unlimited")]
    pub volume_limit: i64,
}

fn unlimited() -> i64 {
    -1
}

impl Default for DirectionLimits {
    fn default() -> Self {
        Self {
            speed_limit: -1,
            volume_limit: -1,
        }
    }
}

impl DirectionLimits {
    pub fn is_speed_limited(&self) -> bool {
        self.speed_limit > 0
    }

    pub fn is_volume_limited(&self) -> bool {
        self.volume_limit > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaperConfig {
    #[serde(default)]
    pub upload: DirectionLimits,

    #[serde(default)]
    pub download: DirectionLimits,

    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log directory for file-based logging; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_log_file")]
    pub log_file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "shaper.log".to_string()
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            upload: DirectionLimits::default(),
            download: DirectionLimits::default(),
            log_level: default_log_level(),
            log_dir: None,
            log_file: default_log_file(),
        }
    }
}

impl ShaperConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn limits(&self, direction: Direction) -> DirectionLimits {
        match direction {
            Direction::Upload => self.upload,
            Direction::Download => self.download,
        }
    }
}
