//! Turn-tracking engine
//!
//! A [`Timeline`] is bound to one world. It owns the turn cursor, the
//! initiative order for the selected map, and two read caches: events by turn
//! and board state by (map, turn). Every write goes through the [`Database`]
//! first; the caches only change after the store accepted the write.
//!
//! While scrubbing, every mutation is rejected with
//! [`TimelineError::Scrubbing`].

mod board;
mod cursor;
mod initiative;
mod log;

pub use cursor::{CursorMode, TurnCursor};
pub use initiative::InitiativeOrder;
pub use log::{TimelineExport, TimelineStats, TurnSummary};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::db::events::{EventRange, EventType, TimelineEvent};
use crate::db::game_state::GameState;
use crate::db::history::BoardToken;
use crate::db::Database;

/// Errors from the turn engine
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("cannot mutate while scrubbing (viewing turn {scrub_turn})")]
    Scrubbing { scrub_turn: i64 },
    #[error("not scrubbing")]
    NotScrubbing,
    #[error("no map selected")]
    NoMap,
    #[error("unknown world: {0}")]
    UnknownWorld(String),
    #[error("unknown map: {0}")]
    UnknownMap(String),
    #[error("unknown placement: {0}")]
    UnknownPlacement(String),
    #[error("failed to encode timeline: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TimelineError>;

/// Windows used by summary and recent-event queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineSettings {
    /// Turns before the current one covered by a default summary
    pub summary_window: i64,
    /// Turns before the display turn covered by recent events
    pub recent_window: i64,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            summary_window: 10,
            recent_window: 5,
        }
    }
}

/// Turn engine for one world
pub struct Timeline {
    db: Arc<Database>,
    world_id: String,
    map_id: Option<String>,
    cursor: TurnCursor,
    initiative: InitiativeOrder,
    events: BTreeMap<i64, Vec<TimelineEvent>>,
    positions: HashMap<(String, i64), Vec<BoardToken>>,
    settings: TimelineSettings,
}

impl Timeline {
    /// Load a world's saved cursor, event log and selected map
    pub fn load(db: Arc<Database>, world_id: &str) -> Result<Self> {
        let world = db
            .load_world(world_id)?
            .ok_or_else(|| TimelineError::UnknownWorld(world_id.to_string()))?;

        let state = db.get_game_state(world_id)?;
        let max_turn = db.get_max_turn_number(world_id)?;
        let current_turn = state.as_ref().map(|s| s.current_turn).unwrap_or(0);

        let mut timeline = Self {
            db,
            world_id: world.id,
            map_id: None,
            cursor: TurnCursor::restore(current_turn, max_turn),
            initiative: InitiativeOrder::default(),
            events: BTreeMap::new(),
            positions: HashMap::new(),
            settings: TimelineSettings::default(),
        };
        timeline.reload_events()?;

        if let Some(map_id) = state.and_then(|s| s.current_map_id) {
            match timeline.set_map(&map_id) {
                Err(TimelineError::UnknownMap(_)) => {
                    tracing::warn!(map_id = %map_id, "saved map no longer exists");
                }
                other => other?,
            }
        }

        tracing::info!(
            world = %world.name,
            turn = timeline.cursor.current_turn(),
            max_turn = timeline.cursor.max_turn(),
            "loaded timeline"
        );
        Ok(timeline)
    }

    /// Replace the summary and recent-event windows
    pub fn with_settings(mut self, settings: TimelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    pub fn map_id(&self) -> Option<&str> {
        self.map_id.as_deref()
    }

    pub fn cursor(&self) -> &TurnCursor {
        &self.cursor
    }

    pub fn current_turn(&self) -> i64 {
        self.cursor.current_turn()
    }

    pub fn max_turn(&self) -> i64 {
        self.cursor.max_turn()
    }

    pub fn is_scrubbing(&self) -> bool {
        self.cursor.is_scrubbing()
    }

    /// The turn the board should show: the scrub turn while scrubbing
    pub fn display_turn(&self) -> i64 {
        self.cursor.display_turn()
    }

    // --- Maps and initiative ---

    /// Make `map_id` the active map and rebuild its initiative order.
    /// Does not touch the saved game state.
    pub fn set_map(&mut self, map_id: &str) -> Result<()> {
        if self.db.get_map(map_id)?.is_none() {
            return Err(TimelineError::UnknownMap(map_id.to_string()));
        }
        self.map_id = Some(map_id.to_string());
        self.reload_initiative()?;
        tracing::debug!(map_id, actors = self.initiative.len(), "selected map");
        Ok(())
    }

    /// Switch maps during play and save the cursor with the new map
    pub fn select_map(&mut self, map_id: &str) -> Result<()> {
        self.cursor.ensure_live()?;
        let previous = self.map_id.clone();
        self.set_map(map_id)?;

        let state = self.game_state(self.cursor.current_turn());
        if let Err(e) = self.db.save_game_state(&state) {
            self.map_id = previous;
            self.reload_initiative()?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Active placements on the selected map, highest initiative first
    pub fn initiative_order(&self) -> &[String] {
        self.initiative.ids()
    }

    /// Rebuild the initiative order from the store
    pub fn reload_initiative(&mut self) -> Result<()> {
        self.initiative = match &self.map_id {
            Some(map_id) => {
                let placements = self.db.list_map_tokens(map_id)?;
                InitiativeOrder::from_placements(placements.iter().filter(|p| p.active))
            }
            None => InitiativeOrder::default(),
        };
        Ok(())
    }

    /// Forget the initiative order until the next reload
    pub fn reset_initiative(&mut self) {
        self.initiative = InitiativeOrder::default();
    }

    /// Persist a placement's initiative and reorder
    pub fn set_token_initiative(&mut self, map_token_id: &str, initiative: i64) -> Result<()> {
        self.cursor.ensure_live()?;
        let placement = self
            .db
            .get_map_token(map_token_id)?
            .ok_or_else(|| TimelineError::UnknownPlacement(map_token_id.to_string()))?;

        self.db.set_map_token_initiative(map_token_id, initiative)?;
        self.invalidate_map(&placement.map_id);
        self.reload_initiative()
    }

    /// Who acts on the display turn
    pub fn current_actor(&self) -> Option<&str> {
        self.initiative.actor_for_turn(self.cursor.display_turn())
    }

    // --- Turn control ---

    /// Start the next turn and return its actor.
    ///
    /// Movement flags and the saved cursor are committed together; if that
    /// fails the in-memory turn does not move. The `turn_start` event is
    /// logged afterwards and a failure there only warns.
    pub fn advance_turn(&mut self) -> Result<Option<String>> {
        let next = self.cursor.next_turn()?;
        let state = self.game_state(next);

        let reset = self.db.begin_turn(&state)?;
        self.cursor.commit_advance(next);
        if let Some(map_id) = self.map_id.clone() {
            self.invalidate_map(&map_id);
        }
        tracing::info!(turn = next, reset, actor = ?state.active_token_id, "turn started");

        let data = serde_json::json!({
            "turn": next,
            "initiative_order": self.initiative.ids(),
        });
        if let Err(e) = self.log_event(
            EventType::TurnStart,
            format!("Turn {} begins", next),
            Some(data),
            "",
        ) {
            tracing::warn!(turn = next, error = %e, "failed to log turn start");
        }

        Ok(state.active_token_id)
    }

    /// Enter scrubbing at the current turn
    pub fn enter_scrub(&mut self) {
        self.cursor.enter_scrub();
        tracing::info!(turn = self.cursor.scrub_turn(), "started scrubbing");
    }

    /// View the board as of `turn`, entering scrubbing if needed.
    /// The turn is clamped to `[0, max_turn]`.
    pub fn scrub_to(&mut self, turn: i64) -> Result<Vec<BoardToken>> {
        if !self.cursor.is_scrubbing() {
            self.enter_scrub();
        }
        let turn = self.cursor.scrub_to(turn)?;
        tracing::debug!(turn, "scrubbed");
        self.positions_at_turn(turn)
    }

    /// Step the view back one turn, entering scrubbing if needed, and return
    /// that turn's actor
    pub fn previous_turn(&mut self) -> Result<Option<String>> {
        if !self.cursor.is_scrubbing() {
            self.enter_scrub();
        }
        let actor = self
            .cursor
            .step_back()?
            .and_then(|turn| self.initiative.actor_for_turn(turn))
            .map(str::to_string);
        Ok(actor)
    }

    /// Return to live play
    pub fn exit_scrub(&mut self) {
        self.cursor.exit_scrub();
        tracing::info!(turn = self.cursor.current_turn(), "stopped scrubbing");
    }

    // --- Internals ---

    fn game_state(&self, turn: i64) -> GameState {
        let mut state = GameState::new(&self.world_id);
        state.current_turn = turn;
        state.current_map_id = self.map_id.clone();
        state.active_token_id = self.initiative.actor_for_turn(turn).map(str::to_string);
        state
    }

    fn reload_events(&mut self) -> Result<()> {
        let events = self
            .db
            .get_timeline_events(&self.world_id, EventRange::default())?;
        self.events.clear();
        for event in events {
            self.events.entry(event.turn_number).or_default().push(event);
        }
        Ok(())
    }

    fn invalidate_map(&mut self, map_id: &str) {
        let before = self.positions.len();
        self.positions.retain(|(cached_map, _), _| cached_map != map_id);
        tracing::debug!(map_id, dropped = before - self.positions.len(), "invalidated board cache");
    }
}
