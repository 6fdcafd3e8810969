//! Engine configuration

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::dice::DEFAULT_MAX_DICE;
use crate::timeline::TimelineSettings;

/// Settings file structure (`turnwarden.toml`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Turns before the current one shown by a default timeline summary
    #[serde(default = "default_summary_window")]
    pub summary_window: i64,
    /// Turns before the display turn covered by recent events
    #[serde(default = "default_recent_window")]
    pub recent_window: i64,
    /// Most dice allowed in a single roll
    #[serde(default = "default_max_dice")]
    pub max_dice: u32,
}

fn default_summary_window() -> i64 {
    10
}

fn default_recent_window() -> i64 {
    5
}

fn default_max_dice() -> u32 {
    DEFAULT_MAX_DICE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            summary_window: default_summary_window(),
            recent_window: default_recent_window(),
            max_dice: default_max_dice(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, falling back to defaults if it is missing
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Windows for the turn engine
    pub fn timeline(&self) -> TimelineSettings {
        TimelineSettings {
            summary_window: self.summary_window,
            recent_window: self.recent_window,
        }
    }
}
