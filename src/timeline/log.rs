//! Event logging, summaries, export and statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Result, Timeline};
use crate::db::events::{EventRange, EventType, TimelineEvent};
use crate::db::format_timestamp;
use crate::db::now_ms;

/// Events logged on one turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnSummary {
    pub turn: i64,
    pub event_count: usize,
    pub events: Vec<TimelineEvent>,
}

/// Portable snapshot of a world's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineExport {
    pub world_id: String,
    pub current_turn: i64,
    pub max_turn: i64,
    /// RFC 3339, UTC
    pub export_timestamp: String,
    pub events: Vec<TimelineEvent>,
}

impl TimelineExport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Event counts for a world
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineStats {
    pub total_turns: i64,
    pub total_events: usize,
    pub events_by_type: BTreeMap<EventType, usize>,
    /// Turn with the most events; the earliest such turn on a tie
    pub most_active_turn: Option<i64>,
    pub most_active_turn_events: usize,
}

impl Timeline {
    /// Record an event on the current turn.
    ///
    /// Rejected while scrubbing. The event cache only sees events the store
    /// accepted.
    pub fn log_event(
        &mut self,
        event_type: EventType,
        title: impl Into<String>,
        data: Option<Value>,
        description: impl Into<String>,
    ) -> Result<TimelineEvent> {
        self.cursor.ensure_live()?;

        let mut event = TimelineEvent::new(
            &self.world_id,
            self.cursor.current_turn(),
            event_type,
            title,
        );
        event.map_id = self.map_id.clone();
        event.description = description.into();
        event.data = data;

        self.db.add_timeline_event(&event)?;
        self.events
            .entry(event.turn_number)
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    /// A placement moved between two grid positions
    pub fn log_token_moved(
        &mut self,
        map_token_id: &str,
        token_name: &str,
        from: (i64, i64),
        to: (i64, i64),
    ) -> Result<TimelineEvent> {
        let data = json!({
            "map_token_id": map_token_id,
            "from": [from.0, from.1],
            "to": [to.0, to.1],
            "distance": distance(from, to),
        });
        self.log_event(
            EventType::TokenMove,
            format!("{} moved", token_name),
            Some(data),
            format!("Moved from ({}, {}) to ({}, {})", from.0, from.1, to.0, to.1),
        )
    }

    /// Record an action in the placement's action list and on the timeline
    pub fn log_token_action(
        &mut self,
        map_token_id: &str,
        token_name: &str,
        action_text: &str,
        action_type: &str,
    ) -> Result<TimelineEvent> {
        self.cursor.ensure_live()?;
        self.db.add_token_action(
            map_token_id,
            self.cursor.current_turn(),
            action_text,
            action_type,
        )?;

        let data = json!({
            "map_token_id": map_token_id,
            "action_type": action_type,
            "action_text": action_text,
        });
        self.log_event(
            EventType::TokenAction,
            format!("{}: {}", token_name, action_text),
            Some(data),
            "",
        )
    }

    pub fn log_token_added(
        &mut self,
        map_token_id: &str,
        token_name: &str,
        position: (i64, i64),
    ) -> Result<TimelineEvent> {
        let data = json!({
            "map_token_id": map_token_id,
            "position": [position.0, position.1],
        });
        self.log_event(
            EventType::TokenAdd,
            format!("{} enters the battlefield", token_name),
            Some(data),
            "",
        )
    }

    pub fn log_token_removed(
        &mut self,
        map_token_id: &str,
        token_name: &str,
        position: (i64, i64),
    ) -> Result<TimelineEvent> {
        let data = json!({
            "map_token_id": map_token_id,
            "position": [position.0, position.1],
        });
        self.log_event(
            EventType::TokenRemove,
            format!("{} leaves the battlefield", token_name),
            Some(data),
            "",
        )
    }

    /// An attack. Zero damage is reported as a plain hit.
    pub fn log_combat_event(
        &mut self,
        attacker: &str,
        target: &str,
        damage: Option<i64>,
        hit: bool,
    ) -> Result<TimelineEvent> {
        let title = match (hit, damage) {
            (true, Some(dmg)) if dmg != 0 => {
                format!("{} hits {} for {} damage", attacker, target, dmg)
            }
            (true, _) => format!("{} hits {}", attacker, target),
            (false, _) => format!("{} misses {}", attacker, target),
        };
        let data = json!({
            "attacker": attacker,
            "target": target,
            "damage": damage,
            "hit": hit,
        });
        self.log_event(EventType::Combat, title, Some(data), "")
    }

    pub fn log_note_added(
        &mut self,
        note_id: &str,
        title: &str,
        location: Option<(i64, i64)>,
    ) -> Result<TimelineEvent> {
        let data = json!({
            "note_id": note_id,
            "location": location.map(|(x, y)| [x, y]),
        });
        self.log_event(
            EventType::NoteAdd,
            format!("Note added: {}", title),
            Some(data),
            "",
        )
    }

    pub fn log_location_discovered(
        &mut self,
        location_name: &str,
        location_type: &str,
    ) -> Result<TimelineEvent> {
        let data = json!({
            "location_name": location_name,
            "location_type": location_type,
        });
        self.log_event(
            EventType::LocationDiscover,
            format!("Discovered {}", location_name),
            Some(data),
            "",
        )
    }

    /// The party travelled to another map
    pub fn log_map_change(
        &mut self,
        old_map_name: &str,
        new_map_name: &str,
        new_map_id: &str,
    ) -> Result<TimelineEvent> {
        let data = json!({
            "old_map": old_map_name,
            "new_map": new_map_name,
            "new_map_id": new_map_id,
        });
        self.log_event(
            EventType::MapChange,
            format!("Moved to {}", new_map_name),
            Some(data),
            format!("Party moved from {} to {}", old_map_name, new_map_name),
        )
    }

    // --- Queries ---

    /// Cached events for one turn, in logging order
    pub fn events_for_turn(&self, turn: i64) -> &[TimelineEvent] {
        self.events.get(&turn).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Per-turn event groups over an inclusive range, skipping empty turns.
    /// Defaults to the last `summary_window` turns up to the current one.
    pub fn timeline_summary(&self, start: Option<i64>, end: Option<i64>) -> Vec<TurnSummary> {
        let current = self.cursor.current_turn();
        let start = start.unwrap_or((current - self.settings.summary_window).max(0));
        let end = end.unwrap_or(current);
        if start > end {
            return Vec::new();
        }

        self.events
            .range(start..=end)
            .filter(|(_, events)| !events.is_empty())
            .map(|(turn, events)| TurnSummary {
                turn: *turn,
                event_count: events.len(),
                events: events.clone(),
            })
            .collect()
    }

    /// Events around the display turn, read from the store
    pub fn recent_events(&self, limit: usize) -> Result<Vec<TimelineEvent>> {
        let display = self.cursor.display_turn();
        let range = EventRange::turns((display - self.settings.recent_window).max(0), display + 1)
            .limit(limit);
        Ok(self.db.get_timeline_events(&self.world_id, range)?)
    }

    /// Export the cursor and an event range
    pub fn export(&self, start: Option<i64>, end: Option<i64>) -> Result<TimelineExport> {
        let range = EventRange {
            start,
            end,
            limit: None,
        };
        let events = self.db.get_timeline_events(&self.world_id, range)?;
        tracing::info!(world_id = %self.world_id, events = events.len(), "exported timeline");

        Ok(TimelineExport {
            world_id: self.world_id.clone(),
            current_turn: self.cursor.current_turn(),
            max_turn: self.cursor.max_turn(),
            export_timestamp: format_timestamp(now_ms()),
            events,
        })
    }

    /// Counts over the full stored log
    pub fn statistics(&self) -> Result<TimelineStats> {
        let events = self
            .db
            .get_timeline_events(&self.world_id, EventRange::default())?;

        let mut stats = TimelineStats {
            total_turns: self.cursor.max_turn(),
            total_events: events.len(),
            ..Default::default()
        };

        let mut per_turn: BTreeMap<i64, usize> = BTreeMap::new();
        for event in &events {
            *stats.events_by_type.entry(event.event_type).or_default() += 1;
            *per_turn.entry(event.turn_number).or_default() += 1;
        }

        for (turn, count) in per_turn {
            if count > stats.most_active_turn_events {
                stats.most_active_turn = Some(turn);
                stats.most_active_turn_events = count;
            }
        }

        Ok(stats)
    }
}

/// Euclidean grid distance, rounded to two decimals
fn distance(from: (i64, i64), to: (i64, i64)) -> f64 {
    let dx = (to.0 - from.0) as f64;
    let dy = (to.1 - from.1) as f64;
    (dx.hypot(dy) * 100.0).round() / 100.0
}
