//! Where the CLI keeps its database and settings
//!
//! `TURNWARDEN_DB` and `TURNWARDEN_CONFIG` name the files directly. Otherwise
//! the database lives under the XDG data home and the settings file under the
//! XDG config home, falling back to `$HOME/.local/share` and `$HOME/.config`.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::PathBuf;

const APP: &str = "turnwarden";

/// Resolved file locations for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub db: PathBuf,
    pub config: PathBuf,
}

impl Paths {
    /// Resolve from the process environment
    pub fn from_env() -> Self {
        Self::resolve(|key| std::env::var_os(key))
    }

    /// Resolve with a custom variable lookup
    pub fn resolve(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let base = |xdg: &str, home_rel: &str| -> PathBuf {
            match (lookup(xdg), lookup("HOME")) {
                (Some(dir), _) if !dir.is_empty() => PathBuf::from(dir).join(APP),
                (_, Some(home)) if !home.is_empty() => PathBuf::from(home).join(home_rel).join(APP),
                _ => PathBuf::from("."),
            }
        };

        let db = lookup("TURNWARDEN_DB")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| base("XDG_DATA_HOME", ".local/share").join("turnwarden.db"));
        let config = lookup("TURNWARDEN_CONFIG")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| base("XDG_CONFIG_HOME", ".config").join("turnwarden.toml"));

        Self { db, config }
    }

    /// Make sure the database file can be created
    pub fn prepare_db_dir(&self) -> Result<()> {
        let Some(dir) = self.db.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return Ok(());
        };
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "creating database directory");
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}
