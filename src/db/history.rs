//! Per-turn position history
//!
//! Each placement has at most one snapshot per turn. "As of turn N" queries
//! take the latest snapshot at or before N and fall back to the live
//! placement row when none exists.

use super::{decode_json, new_id, now_ms, Database};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A placement's recorded state on one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub map_token_id: String,
    pub turn_number: i64,
    pub x: i64,
    pub y: i64,
    pub hp: Option<i64>,
    pub status_effects: Option<Vec<String>>,
    pub created_at: i64,
}

/// Where a board token's position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "turn")]
pub enum PositionSource {
    /// The live placement row
    Live,
    /// A history snapshot taken on this turn
    Snapshot(i64),
}

/// A placement joined with its template, positioned for a given turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardToken {
    pub map_token_id: String,
    pub token_id: String,

    // Template
    pub name: String,
    pub image_path: String,
    pub size: i64,
    pub color: String,
    pub token_type: String,
    pub max_hp: i64,

    // Placement
    pub x: i64,
    pub y: i64,
    pub rotation: i64,
    pub active: bool,
    pub initiative: i64,
    pub has_moved: bool,

    // State
    pub hp: Option<i64>,
    pub status_effects: Vec<String>,
    pub source: PositionSource,
}

// Live and historical reads share one shape. Columns 0..=13 come from the
// placement and template; 14..=18 from the snapshot, all NULL when none matched.
const BOARD_QUERY: &str = r#"
SELECT mt.id, mt.token_id,
       t.name, t.image_path, t.size, t.color, t.token_type, t.max_hp,
       mt.x, mt.y, mt.rotation, mt.active, mt.initiative, mt.has_moved,
       t.current_hp,
       tph.turn_number, tph.x, tph.y, tph.hp, tph.status_effects
FROM map_tokens mt
JOIN tokens t ON mt.token_id = t.id
LEFT JOIN token_position_history tph
    ON tph.map_token_id = mt.id
   AND tph.turn_number = (
        SELECT MAX(turn_number)
        FROM token_position_history
        WHERE map_token_id = mt.id AND turn_number <= ?2
   )
WHERE mt.map_id = ?1
ORDER BY mt.initiative DESC, mt.id
"#;

// Database operations
impl Database {
    /// Upsert a snapshot for (placement, turn)
    pub fn save_token_position(
        &self,
        map_token_id: &str,
        turn: i64,
        x: i64,
        y: i64,
        hp: Option<i64>,
        status_effects: Option<&[String]>,
    ) -> Result<()> {
        let conn = self.conn()?;
        Self::upsert_position(&conn, map_token_id, turn, x, y, hp, status_effects)
    }

    pub(crate) fn upsert_position(
        conn: &Connection,
        map_token_id: &str,
        turn: i64,
        x: i64,
        y: i64,
        hp: Option<i64>,
        status_effects: Option<&[String]>,
    ) -> Result<()> {
        if turn < 0 {
            anyhow::bail!("turn number must be non-negative, got {}", turn);
        }
        let status_json = status_effects
            .map(serde_json::to_string)
            .transpose()
            .context("failed to serialize status effects")?;

        conn.execute(
            r#"
            INSERT INTO token_position_history
                (id, map_token_id, turn_number, x, y, hp, status_effects, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (map_token_id, turn_number) DO UPDATE SET
                x = excluded.x,
                y = excluded.y,
                hp = excluded.hp,
                status_effects = excluded.status_effects,
                created_at = excluded.created_at
            "#,
            params![new_id(), map_token_id, turn, x, y, hp, status_json, now_ms()],
        )
        .context("failed to save token position")?;
        Ok(())
    }

    /// Latest snapshot for a placement with turn_number <= `turn`
    pub fn get_token_position_at_turn(
        &self,
        map_token_id: &str,
        turn: i64,
    ) -> Result<Option<TokenSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
            SELECT map_token_id, turn_number, x, y, hp, status_effects, created_at
            FROM token_position_history
            WHERE map_token_id = ?1 AND turn_number <= ?2
            ORDER BY turn_number DESC
            LIMIT 1
            "#,
            )
            .context("failed to prepare position query")?;

        let snapshot = stmt
            .query_row(params![map_token_id, turn], |row| {
                Ok(TokenSnapshot {
                    map_token_id: row.get(0)?,
                    turn_number: row.get(1)?,
                    x: row.get(2)?,
                    y: row.get(3)?,
                    hp: row.get(4)?,
                    status_effects: decode_json(row.get(5)?, "status_effects"),
                    created_at: row.get(6)?,
                })
            })
            .optional()
            .context("failed to query token position")?;

        Ok(snapshot)
    }

    /// Every placement on a map as of `turn`, snapshot where one exists and
    /// the live row otherwise
    pub fn get_all_token_positions_at_turn(
        &self,
        map_id: &str,
        turn: i64,
    ) -> Result<Vec<BoardToken>> {
        self.query_board(map_id, Some(turn))
    }

    /// Live rows when `turn` is `None`, the historical merge otherwise
    pub fn get_map_tokens_with_history(
        &self,
        map_id: &str,
        turn: Option<i64>,
    ) -> Result<Vec<BoardToken>> {
        self.query_board(map_id, turn)
    }

    fn query_board(&self, map_id: &str, turn: Option<i64>) -> Result<Vec<BoardToken>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(BOARD_QUERY)
            .context("failed to prepare board query")?;

        // A NULL turn makes the snapshot subquery match nothing
        let board = stmt
            .query(params![map_id, turn])?
            .mapped(Self::board_token_from_sqlite)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to query board")?;

        Ok(board)
    }

    fn board_token_from_sqlite(row: &rusqlite::Row) -> rusqlite::Result<BoardToken> {
        let live_hp: i64 = row.get(14)?;
        let snapshot_turn: Option<i64> = row.get(15)?;

        let (source, x, y, hp, status_effects) = match snapshot_turn {
            Some(turn) => (
                PositionSource::Snapshot(turn),
                row.get(16)?,
                row.get(17)?,
                row.get::<_, Option<i64>>(18)?,
                decode_json::<Vec<String>>(row.get(19)?, "status_effects").unwrap_or_default(),
            ),
            None => (
                PositionSource::Live,
                row.get(8)?,
                row.get(9)?,
                Some(live_hp),
                Vec::new(),
            ),
        };

        Ok(BoardToken {
            map_token_id: row.get(0)?,
            token_id: row.get(1)?,
            name: row.get(2)?,
            image_path: row.get(3)?,
            size: row.get(4)?,
            color: row.get(5)?,
            token_type: row.get(6)?,
            max_hp: row.get(7)?,
            x,
            y,
            rotation: row.get(10)?,
            active: row.get::<_, i32>(11)? != 0,
            initiative: row.get(12)?,
            has_moved: row.get::<_, i32>(13)? != 0,
            hp,
            status_effects,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tokens::tests::{place, setup_map};

    #[test]
    fn test_upsert_replaces_same_turn() -> Result<()> {
        let db = Database::in_memory()?;
        let map = setup_map(&db)?;
        let pt = place(&db, &map, "Fighter", 0, 0, 10)?;

        db.save_token_position(&pt.id, 5, 3, 4, None, None)?;
        db.save_token_position(&pt.id, 5, 7, 8, Some(9), None)?;

        let count: i64 = db.conn()?.query_row(
            "SELECT COUNT(*) FROM token_position_history WHERE map_token_id = ?1 AND turn_number = 5",
            params![pt.id],
            |row| row.get(0),
        )?;
        assert_eq!(count, 1);

        let snap = db.get_token_position_at_turn(&pt.id, 5)?.expect("snapshot");
        assert_eq!((snap.x, snap.y, snap.hp), (7, 8, Some(9)));
        Ok(())
    }

    #[test]
    fn test_as_of_query() -> Result<()> {
        let db = Database::in_memory()?;
        let map = setup_map(&db)?;
        let pt = place(&db, &map, "Ranger", 0, 0, 10)?;

        db.save_token_position(&pt.id, 2, 1, 1, None, None)?;
        db.save_token_position(&pt.id, 5, 2, 2, None, None)?;

        let at_four = db.get_token_position_at_turn(&pt.id, 4)?.expect("turn 2 snapshot");
        assert_eq!(at_four.turn_number, 2);
        assert_eq!((at_four.x, at_four.y), (1, 1));

        let at_five = db.get_token_position_at_turn(&pt.id, 5)?.expect("turn 5 snapshot");
        assert_eq!(at_five.turn_number, 5);

        assert!(db.get_token_position_at_turn(&pt.id, 1)?.is_none());
        Ok(())
    }

    #[test]
    fn test_negative_turn_rejected() -> Result<()> {
        let db = Database::in_memory()?;
        let map = setup_map(&db)?;
        let pt = place(&db, &map, "Bard", 0, 0, 10)?;
        assert!(db.save_token_position(&pt.id, -1, 0, 0, None, None).is_err());
        Ok(())
    }

    #[test]
    fn test_status_effects_round_trip() -> Result<()> {
        let db = Database::in_memory()?;
        let map = setup_map(&db)?;
        let pt = place(&db, &map, "Monk", 0, 0, 10)?;

        let effects = vec!["stunned".to_string(), "prone".to_string()];
        db.save_token_position(&pt.id, 1, 2, 2, Some(4), Some(&effects))?;

        let snap = db.get_token_position_at_turn(&pt.id, 1)?.expect("snapshot");
        assert_eq!(snap.status_effects, Some(effects));
        Ok(())
    }

    #[test]
    fn test_corrupt_status_effects_read_as_missing() -> Result<()> {
        let db = Database::in_memory()?;
        let map = setup_map(&db)?;
        let pt = place(&db, &map, "Druid", 0, 0, 10)?;
        db.save_token_position(&pt.id, 1, 2, 2, Some(4), None)?;
        db.conn()?.execute(
            "UPDATE token_position_history SET status_effects = '[oops' WHERE map_token_id = ?1",
            params![pt.id],
        )?;

        let snap = db.get_token_position_at_turn(&pt.id, 1)?.expect("snapshot");
        assert!(snap.status_effects.is_none());
        assert_eq!(snap.hp, Some(4));

        let board = db.get_all_token_positions_at_turn(&map.id, 1)?;
        assert_eq!(board.len(), 1);
        assert!(board[0].status_effects.is_empty());
        Ok(())
    }

    #[test]
    fn test_board_merges_history_and_live() -> Result<()> {
        let db = Database::in_memory()?;
        let map = setup_map(&db)?;
        // full history, partial history, none
        let full = place(&db, &map, "Full", 0, 0, 30)?;
        let partial = place(&db, &map, "Partial", 10, 10, 20)?;
        let none = place(&db, &map, "None", 20, 20, 10)?;

        db.save_token_position(&full.id, 0, 1, 1, None, None)?;
        db.save_token_position(&full.id, 1, 2, 2, None, None)?;
        db.save_token_position(&full.id, 2, 3, 3, None, None)?;
        db.save_token_position(&partial.id, 2, 11, 11, None, None)?;

        let board = db.get_all_token_positions_at_turn(&map.id, 1)?;
        assert_eq!(board.len(), 3);

        let by_id = |id: &str| board.iter().find(|b| b.map_token_id == id).cloned();

        let f = by_id(&full.id).expect("full");
        assert_eq!((f.x, f.y), (2, 2));
        assert_eq!(f.source, PositionSource::Snapshot(1));
        assert_eq!(f.name, "Full");

        let p = by_id(&partial.id).expect("partial");
        assert_eq!((p.x, p.y), (10, 10));
        assert_eq!(p.source, PositionSource::Live);

        let n = by_id(&none.id).expect("none");
        assert_eq!((n.x, n.y), (20, 20));
        assert_eq!(n.source, PositionSource::Live);
        assert_eq!(n.hp, Some(10));
        Ok(())
    }

    #[test]
    fn test_map_tokens_with_history_live_mode() -> Result<()> {
        let db = Database::in_memory()?;
        let map = setup_map(&db)?;
        let pt = place(&db, &map, "Paladin", 4, 4, 15)?;
        db.save_token_position(&pt.id, 1, 9, 9, None, None)?;

        let live = db.get_map_tokens_with_history(&map.id, None)?;
        assert_eq!(live.len(), 1);
        assert_eq!((live[0].x, live[0].y), (4, 4));
        assert_eq!(live[0].source, PositionSource::Live);

        let past = db.get_map_tokens_with_history(&map.id, Some(1))?;
        assert_eq!((past[0].x, past[0].y), (9, 9));
        Ok(())
    }
}
