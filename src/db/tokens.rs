//! Token templates, placements, and per-turn actions
//!
//! A `Token` is a reusable actor definition. A `MapToken` places one on a map
//! with its own position and initiative; the same template can be placed many
//! times. Initiative order and position history operate on placements.

use super::{new_id, now_ms, Database};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Reusable actor definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub name: String,
    pub image_path: String,
    pub size: i64,
    pub color: String,
    pub token_type: String,
    pub notes: Option<String>,
    pub initiative: i64,
    pub max_hp: i64,
    pub current_hp: i64,
    pub created_at: i64,
}

impl Token {
    /// Create a new token template at full health
    pub fn new(name: impl Into<String>, image_path: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            image_path: image_path.into(),
            size: 1,
            color: "255,0,0".to_string(),
            token_type: "character".to_string(),
            notes: None,
            initiative: 0,
            max_hp: 10,
            current_hp: 10,
            created_at: now_ms(),
        }
    }

    /// Set max and current HP together
    pub fn with_hp(mut self, hp: i64) -> Self {
        self.max_hp = hp;
        self.current_hp = hp;
        self
    }
}

/// A token template placed on a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapToken {
    pub id: String,
    pub map_id: String,
    pub token_id: String,
    pub x: i64,
    pub y: i64,
    pub rotation: i64,
    pub active: bool,
    pub initiative: i64,
    pub has_moved: bool,
    pub current_turn: i64,
}

impl MapToken {
    /// Place a token at (x, y). Initiative starts at the template default.
    pub fn new(map_id: impl Into<String>, token: &Token, x: i64, y: i64) -> Self {
        Self {
            id: new_id(),
            map_id: map_id.into(),
            token_id: token.id.clone(),
            x,
            y,
            rotation: 0,
            active: true,
            initiative: token.initiative,
            has_moved: false,
            current_turn: 0,
        }
    }

    /// Override the placement's initiative
    pub fn with_initiative(mut self, initiative: i64) -> Self {
        self.initiative = initiative;
        self
    }
}

/// Free-text action a placement took on a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAction {
    pub id: String,
    pub map_token_id: String,
    pub turn_number: i64,
    pub action_text: String,
    pub action_type: String,
    pub created_at: i64,
}

const TOKEN_COLUMNS: &str =
    "id, name, image_path, size, color, token_type, notes, initiative, max_hp, current_hp, created_at";

const MAP_TOKEN_COLUMNS: &str =
    "id, map_id, token_id, x, y, rotation, active, initiative, has_moved, current_turn";

// Database operations
impl Database {
    // --- Token templates ---

    /// Insert a token template
    pub fn insert_token(&self, token: &Token) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO tokens ({TOKEN_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                token.id,
                token.name,
                token.image_path,
                token.size,
                token.color,
                token.token_type,
                token.notes,
                token.initiative,
                token.max_hp,
                token.current_hp,
                token.created_at,
            ],
        )
        .context("failed to insert token")?;
        Ok(())
    }

    /// Get token template by ID
    pub fn get_token(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE id = ?1"))
            .context("failed to prepare token query")?;

        let token = stmt
            .query_row(params![id], Self::token_from_sqlite)
            .optional()
            .context("failed to query token")?;

        Ok(token)
    }

    /// List all token templates by name
    pub fn list_tokens(&self) -> Result<Vec<Token>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {TOKEN_COLUMNS} FROM tokens ORDER BY name"))
            .context("failed to prepare tokens query")?;

        let tokens = stmt
            .query([])?
            .mapped(Self::token_from_sqlite)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to list tokens")?;

        Ok(tokens)
    }

    /// Set a template's current HP
    pub fn set_token_hp(&self, id: &str, current_hp: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE tokens SET current_hp = ?1 WHERE id = ?2",
            params![current_hp, id],
        )
        .context("failed to set token hp")?;
        Ok(())
    }

    // --- Placements ---

    /// Insert a placement
    pub fn insert_map_token(&self, placement: &MapToken) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO map_tokens ({MAP_TOKEN_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                placement.id,
                placement.map_id,
                placement.token_id,
                placement.x,
                placement.y,
                placement.rotation,
                placement.active as i32,
                placement.initiative,
                placement.has_moved as i32,
                placement.current_turn,
            ],
        )
        .context("failed to insert map token")?;
        Ok(())
    }

    /// Get placement by ID
    pub fn get_map_token(&self, id: &str) -> Result<Option<MapToken>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MAP_TOKEN_COLUMNS} FROM map_tokens WHERE id = ?1"
            ))
            .context("failed to prepare map token query")?;

        let placement = stmt
            .query_row(params![id], Self::map_token_from_sqlite)
            .optional()
            .context("failed to query map token")?;

        Ok(placement)
    }

    /// List placements on a map in placement order
    pub fn list_map_tokens(&self, map_id: &str) -> Result<Vec<MapToken>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MAP_TOKEN_COLUMNS} FROM map_tokens WHERE map_id = ?1 ORDER BY id"
            ))
            .context("failed to prepare map tokens query")?;

        let placements = stmt
            .query(params![map_id])?
            .mapped(Self::map_token_from_sqlite)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to list map tokens")?;

        Ok(placements)
    }

    /// Set a placement's initiative value
    pub fn set_map_token_initiative(&self, id: &str, initiative: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE map_tokens SET initiative = ?1 WHERE id = ?2",
            params![initiative, id],
        )
        .context("failed to set initiative")?;
        Ok(())
    }

    /// Activate or deactivate a placement
    pub fn set_map_token_active(&self, id: &str, active: bool) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE map_tokens SET active = ?1 WHERE id = ?2",
            params![active as i32, id],
        )
        .context("failed to set active flag")?;
        Ok(())
    }

    /// Remove a placement (cascades to its history and actions)
    pub fn delete_map_token(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM map_tokens WHERE id = ?1", params![id])
            .context("failed to delete map token")?;
        Ok(())
    }

    /// Move a placement and record the move in position history.
    ///
    /// Both writes happen in one transaction. Fails if the placement is unknown.
    pub fn update_token_position(
        &self,
        map_token_id: &str,
        x: i64,
        y: i64,
        turn: i64,
        has_moved: bool,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;

        let updated = tx
            .execute(
                "UPDATE map_tokens SET x = ?1, y = ?2, has_moved = ?3, current_turn = ?4
                 WHERE id = ?5",
                params![x, y, has_moved as i32, turn, map_token_id],
            )
            .context("failed to update token position")?;
        if updated == 0 {
            anyhow::bail!("map token {} not found", map_token_id);
        }

        Self::upsert_position(&tx, map_token_id, turn, x, y, None, None)?;

        tx.commit().context("failed to commit token move")?;
        tracing::debug!(map_token_id, x, y, turn, "moved token");
        Ok(())
    }

    /// Clear `has_moved` for every placement on a map
    pub fn reset_token_movement_flags(&self, map_id: &str, turn: i64) -> Result<usize> {
        let conn = self.conn()?;
        Self::reset_movement(&conn, map_id, turn)
    }

    pub(crate) fn reset_movement(conn: &Connection, map_id: &str, turn: i64) -> Result<usize> {
        conn.execute(
            "UPDATE map_tokens SET has_moved = 0, current_turn = ?1 WHERE map_id = ?2",
            params![turn, map_id],
        )
        .context("failed to reset movement flags")
    }

    // --- Actions ---

    /// Record an action taken by a placement
    pub fn add_token_action(
        &self,
        map_token_id: &str,
        turn: i64,
        action_text: &str,
        action_type: &str,
    ) -> Result<TokenAction> {
        let action = TokenAction {
            id: new_id(),
            map_token_id: map_token_id.to_string(),
            turn_number: turn,
            action_text: action_text.to_string(),
            action_type: action_type.to_string(),
            created_at: now_ms(),
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO token_actions (id, map_token_id, turn_number, action_text, action_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                action.id,
                action.map_token_id,
                action.turn_number,
                action.action_text,
                action.action_type,
                action.created_at,
            ],
        )
        .context("failed to insert token action")?;
        Ok(action)
    }

    /// Get a placement's actions, optionally for one turn, in turn order
    pub fn get_token_actions(
        &self,
        map_token_id: &str,
        turn: Option<i64>,
    ) -> Result<Vec<TokenAction>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
            SELECT id, map_token_id, turn_number, action_text, action_type, created_at
            FROM token_actions
            WHERE map_token_id = ?1 AND (?2 IS NULL OR turn_number = ?2)
            ORDER BY turn_number, created_at, rowid
            "#,
            )
            .context("failed to prepare token actions query")?;

        let actions = stmt
            .query(params![map_token_id, turn])?
            .mapped(|row| {
                Ok(TokenAction {
                    id: row.get(0)?,
                    map_token_id: row.get(1)?,
                    turn_number: row.get(2)?,
                    action_text: row.get(3)?,
                    action_type: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .context("failed to list token actions")?;

        Ok(actions)
    }

    fn token_from_sqlite(row: &rusqlite::Row) -> rusqlite::Result<Token> {
        Ok(Token {
            id: row.get(0)?,
            name: row.get(1)?,
            image_path: row.get(2)?,
            size: row.get(3)?,
            color: row.get(4)?,
            token_type: row.get(5)?,
            notes: row.get(6)?,
            initiative: row.get(7)?,
            max_hp: row.get(8)?,
            current_hp: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    pub(crate) fn map_token_from_sqlite(row: &rusqlite::Row) -> rusqlite::Result<MapToken> {
        Ok(MapToken {
            id: row.get(0)?,
            map_id: row.get(1)?,
            token_id: row.get(2)?,
            x: row.get(3)?,
            y: row.get(4)?,
            rotation: row.get(5)?,
            active: row.get::<_, i32>(6)? != 0,
            initiative: row.get(7)?,
            has_moved: row.get::<_, i32>(8)? != 0,
            current_turn: row.get(9)?,
        })
    }
}
