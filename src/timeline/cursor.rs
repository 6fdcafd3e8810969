//! Turn cursor: which turn is live, and whether we are viewing history

use serde::Serialize;

use super::{Result, TimelineError};

/// Live play or read-only history viewing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    Live,
    Scrubbing,
}

/// Turn state machine.
///
/// `current_turn` only moves forward, and only while live. `scrub_turn` is
/// free to roam `[0, max_turn]` while scrubbing and equals `current_turn`
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnCursor {
    current_turn: i64,
    max_turn: i64,
    scrub_turn: i64,
    mode: CursorMode,
}

impl Default for TurnCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnCursor {
    /// Live at turn 0
    pub fn new() -> Self {
        Self {
            current_turn: 0,
            max_turn: 0,
            scrub_turn: 0,
            mode: CursorMode::Live,
        }
    }

    /// Restore a persisted cursor. `max_turn` is raised to at least `current_turn`.
    pub fn restore(current_turn: i64, max_turn: i64) -> Self {
        let current_turn = current_turn.max(0);
        Self {
            current_turn,
            max_turn: max_turn.max(current_turn),
            scrub_turn: current_turn,
            mode: CursorMode::Live,
        }
    }

    pub fn current_turn(&self) -> i64 {
        self.current_turn
    }

    pub fn max_turn(&self) -> i64 {
        self.max_turn
    }

    pub fn scrub_turn(&self) -> i64 {
        self.scrub_turn
    }

    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    pub fn is_scrubbing(&self) -> bool {
        self.mode == CursorMode::Scrubbing
    }

    /// The turn the view should render
    pub fn display_turn(&self) -> i64 {
        match self.mode {
            CursorMode::Live => self.current_turn,
            CursorMode::Scrubbing => self.scrub_turn,
        }
    }

    /// Fail with `Scrubbing` unless live
    pub fn ensure_live(&self) -> Result<()> {
        match self.mode {
            CursorMode::Live => Ok(()),
            CursorMode::Scrubbing => Err(TimelineError::Scrubbing {
                scrub_turn: self.scrub_turn,
            }),
        }
    }

    /// The turn an advance would move to. Does not change the cursor.
    pub fn next_turn(&self) -> Result<i64> {
        self.ensure_live()?;
        Ok(self.current_turn + 1)
    }

    /// Apply a turn obtained from `next_turn` once it has been persisted
    pub fn commit_advance(&mut self, turn: i64) {
        debug_assert_eq!(turn, self.current_turn + 1);
        self.current_turn = turn;
        self.scrub_turn = turn;
        if turn > self.max_turn {
            self.max_turn = turn;
        }
    }

    /// Enter scrubbing at the current turn
    pub fn enter_scrub(&mut self) {
        self.mode = CursorMode::Scrubbing;
        self.scrub_turn = self.current_turn;
    }

    /// Move the scrub position, clamped to `[0, max_turn]`
    pub fn scrub_to(&mut self, turn: i64) -> Result<i64> {
        if !self.is_scrubbing() {
            return Err(TimelineError::NotScrubbing);
        }
        self.scrub_turn = turn.clamp(0, self.max_turn);
        Ok(self.scrub_turn)
    }

    /// Step the scrub position back one turn. `None` when already at turn 0.
    pub fn step_back(&mut self) -> Result<Option<i64>> {
        if !self.is_scrubbing() {
            return Err(TimelineError::NotScrubbing);
        }
        if self.scrub_turn == 0 {
            return Ok(None);
        }
        self.scrub_turn -= 1;
        Ok(Some(self.scrub_turn))
    }

    /// Return to live play at the current turn
    pub fn exit_scrub(&mut self) {
        self.mode = CursorMode::Live;
        self.scrub_turn = self.current_turn;
    }
}
