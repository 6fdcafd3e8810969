//! Database module for turnwarden
//!
//! Provides persistence for worlds, maps, tokens, placements, per-turn
//! position history, timeline events, and the per-world game state.
//! Uses SQLite with UUIDv7 for primary keys so ids sort by creation time.

mod schema;

pub mod events;
pub mod game_state;
pub mod history;
pub mod maps;
pub mod tokens;
pub mod worlds;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub use schema::{SCHEMA, SCHEMA_VERSION};

/// Generate a new UUIDv7 (time-sorted)
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Get current Unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Format a timestamp (milliseconds since epoch) as RFC 3339
pub fn format_timestamp(ms: i64) -> String {
    use chrono::{DateTime, SecondsFormat, Utc};
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("{}", ms))
}

/// Decode a JSON text column, treating corrupt content as missing.
pub(crate) fn decode_json<T: DeserializeOwned>(raw: Option<String>, column: &str) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(column, error = %e, "ignoring malformed json column");
            None
        }
    }
}

/// Database handle (thread-safe via Mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Acquire the database connection, converting PoisonError to anyhow::Error.
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("database lock poisoned: {}", e))
    }

    /// Open or create database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("failed to open database at {:?}", path.as_ref()))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Initialize schema and run migrations
    fn init(&self) -> Result<()> {
        self.conn()?
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("failed to enable foreign keys")?;

        let version = self.get_schema_version()?;

        if version < SCHEMA_VERSION {
            self.conn()?
                .execute_batch(SCHEMA)
                .context("failed to create schema")?;
            self.set_schema_version(SCHEMA_VERSION)?;
            tracing::info!("initialized database schema version {}", SCHEMA_VERSION);
        }

        Ok(())
    }

    /// Get current schema version from user_version pragma
    fn get_schema_version(&self) -> Result<i32> {
        let conn = self.conn()?;
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("failed to get schema version")?;
        Ok(version)
    }

    /// Set schema version using user_version pragma
    fn set_schema_version(&self, version: i32) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(&format!("PRAGMA user_version = {}", version), [])
            .context("failed to set schema version")?;
        Ok(())
    }
}
