//! Token placement, movement and the board view

use super::{Result, Timeline, TimelineError};
use crate::db::history::BoardToken;
use crate::db::tokens::{MapToken, Token};

impl Timeline {
    /// Snapshot a placement's state on the current turn
    pub fn save_token_state(
        &mut self,
        map_token_id: &str,
        x: i64,
        y: i64,
        hp: Option<i64>,
        status_effects: Option<&[String]>,
    ) -> Result<()> {
        self.cursor.ensure_live()?;
        let placement = self.placement(map_token_id)?;

        self.db.save_token_position(
            map_token_id,
            self.cursor.current_turn(),
            x,
            y,
            hp,
            status_effects,
        )?;
        self.invalidate_map(&placement.map_id);
        Ok(())
    }

    /// Move a placement on the current turn and mark it as moved.
    ///
    /// When `token_name` is given and the position changed, a `token_move`
    /// event is logged as well.
    pub fn update_token_position(
        &mut self,
        map_token_id: &str,
        x: i64,
        y: i64,
        token_name: Option<&str>,
    ) -> Result<()> {
        self.cursor.ensure_live()?;
        let placement = self.placement(map_token_id)?;
        let from = (placement.x, placement.y);

        self.db
            .update_token_position(map_token_id, x, y, self.cursor.current_turn(), true)?;
        self.invalidate_map(&placement.map_id);

        if let Some(name) = token_name {
            if from != (x, y) {
                if let Err(e) = self.log_token_moved(map_token_id, name, from, (x, y)) {
                    tracing::warn!(map_token_id, error = %e, "moved token but failed to log it");
                }
            }
        }
        Ok(())
    }

    /// Put a token on the selected map. Initiative defaults to the template's.
    pub fn place_token(
        &mut self,
        token: &Token,
        x: i64,
        y: i64,
        initiative: Option<i64>,
    ) -> Result<MapToken> {
        self.cursor.ensure_live()?;
        let map_id = self.map_id.clone().ok_or(TimelineError::NoMap)?;

        let mut placement = MapToken::new(&map_id, token, x, y);
        if let Some(initiative) = initiative {
            placement = placement.with_initiative(initiative);
        }
        placement.current_turn = self.cursor.current_turn();

        self.db.insert_map_token(&placement)?;
        self.db.save_token_position(
            &placement.id,
            self.cursor.current_turn(),
            x,
            y,
            Some(token.current_hp),
            None,
        )?;
        self.invalidate_map(&map_id);
        self.reload_initiative()?;

        if let Err(e) = self.log_token_added(&placement.id, &token.name, (x, y)) {
            tracing::warn!(map_token_id = %placement.id, error = %e, "placed token but failed to log it");
        }
        Ok(placement)
    }

    /// Take a placement off its map. Its position history goes with it.
    pub fn remove_token(&mut self, map_token_id: &str) -> Result<()> {
        self.cursor.ensure_live()?;
        let placement = self.placement(map_token_id)?;
        let name = self
            .db
            .get_token(&placement.token_id)?
            .map(|t| t.name)
            .unwrap_or_else(|| placement.token_id.clone());

        self.db.delete_map_token(map_token_id)?;
        self.invalidate_map(&placement.map_id);
        self.reload_initiative()?;

        if let Err(e) = self.log_token_removed(map_token_id, &name, (placement.x, placement.y)) {
            tracing::warn!(map_token_id, error = %e, "removed token but failed to log it");
        }
        Ok(())
    }

    /// Board for the selected map as of `turn`, cached per (map, turn).
    /// Empty when no map is selected.
    pub fn positions_at_turn(&mut self, turn: i64) -> Result<Vec<BoardToken>> {
        let Some(map_id) = self.map_id.clone() else {
            return Ok(Vec::new());
        };

        let key = (map_id, turn);
        if let Some(cached) = self.positions.get(&key) {
            tracing::debug!(map_id = %key.0, turn, "board cache hit");
            return Ok(cached.clone());
        }

        let board = self.db.get_all_token_positions_at_turn(&key.0, turn)?;
        tracing::debug!(map_id = %key.0, turn, tokens = board.len(), "board cache miss");
        self.positions.insert(key, board.clone());
        Ok(board)
    }

    /// What the view should draw: live placements, or history while scrubbing
    pub fn board(&mut self) -> Result<Vec<BoardToken>> {
        if self.cursor.is_scrubbing() {
            return self.positions_at_turn(self.cursor.scrub_turn());
        }
        match &self.map_id {
            Some(map_id) => Ok(self.db.get_map_tokens_with_history(map_id, None)?),
            None => Ok(Vec::new()),
        }
    }

    fn placement(&self, map_token_id: &str) -> Result<MapToken> {
        self.db
            .get_map_token(map_token_id)?
            .ok_or_else(|| TimelineError::UnknownPlacement(map_token_id.to_string()))
    }
}
