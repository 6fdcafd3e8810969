//! Per-world game state
//!
//! One row per world holding the persisted turn cursor.

use super::{decode_json, now_ms, Database};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted cursor for a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub world_id: String,
    pub current_turn: i64,
    pub current_map_id: Option<String>,
    pub active_token_id: Option<String>,
    pub state_data: Option<Value>,
    pub updated_at: i64,
}

impl GameState {
    /// Fresh state at turn 0
    pub fn new(world_id: impl Into<String>) -> Self {
        Self {
            world_id: world_id.into(),
            current_turn: 0,
            current_map_id: None,
            active_token_id: None,
            state_data: None,
            updated_at: now_ms(),
        }
    }
}

// Database operations
impl Database {
    /// Upsert the singleton state for a world
    pub fn save_game_state(&self, state: &GameState) -> Result<()> {
        let conn = self.conn()?;
        Self::upsert_game_state(&conn, state)
    }

    /// Get the last saved state for a world
    pub fn get_game_state(&self, world_id: &str) -> Result<Option<GameState>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
            SELECT world_id, current_turn, current_map_id, active_token_id, state_data, updated_at
            FROM game_state WHERE world_id = ?1
            "#,
            )
            .context("failed to prepare game state query")?;

        let state = stmt
            .query_row(params![world_id], |row| {
                Ok(GameState {
                    world_id: row.get(0)?,
                    current_turn: row.get(1)?,
                    current_map_id: row.get(2)?,
                    active_token_id: row.get(3)?,
                    state_data: decode_json(row.get(4)?, "state_data"),
                    updated_at: row.get(5)?,
                })
            })
            .optional()
            .context("failed to query game state")?;

        Ok(state)
    }

    /// Commit the start of a turn: clear movement flags on the map and save
    /// the cursor, atomically. Nothing is written if either step fails.
    pub fn begin_turn(&self, state: &GameState) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;

        let reset = match &state.current_map_id {
            Some(map_id) => Self::reset_movement(&tx, map_id, state.current_turn)?,
            None => 0,
        };

        Self::upsert_game_state(&tx, state)?;
        tx.commit().context("failed to commit turn")?;
        Ok(reset)
    }

    fn upsert_game_state(conn: &Connection, state: &GameState) -> Result<()> {
        let data = state
            .state_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to serialize state data")?;

        conn.execute(
            r#"
            INSERT INTO game_state
                (world_id, current_turn, current_map_id, active_token_id, state_data, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (world_id) DO UPDATE SET
                current_turn = excluded.current_turn,
                current_map_id = excluded.current_map_id,
                active_token_id = excluded.active_token_id,
                state_data = excluded.state_data,
                updated_at = excluded.updated_at
            "#,
            params![
                state.world_id,
                state.current_turn,
                state.current_map_id,
                state.active_token_id,
                data,
                state.updated_at,
            ],
        )
        .context("failed to save game state")?;
        Ok(())
    }
}
