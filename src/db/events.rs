//! Timeline event storage
//!
//! Append-only per-world log. Reads are ordered by (turn, creation time).

use super::{decode_json, new_id, now_ms, Database};
use anyhow::{Context, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TurnStart,
    TokenMove,
    TokenAction,
    TokenAdd,
    TokenRemove,
    Combat,
    NoteAdd,
    LocationDiscover,
    MapChange,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TurnStart => "turn_start",
            EventType::TokenMove => "token_move",
            EventType::TokenAction => "token_action",
            EventType::TokenAdd => "token_add",
            EventType::TokenRemove => "token_remove",
            EventType::Combat => "combat",
            EventType::NoteAdd => "note_add",
            EventType::LocationDiscover => "location_discover",
            EventType::MapChange => "map_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "turn_start" => Some(EventType::TurnStart),
            "token_move" => Some(EventType::TokenMove),
            "token_action" => Some(EventType::TokenAction),
            "token_add" => Some(EventType::TokenAdd),
            "token_remove" => Some(EventType::TokenRemove),
            "combat" => Some(EventType::Combat),
            "note_add" => Some(EventType::NoteAdd),
            "location_discover" => Some(EventType::LocationDiscover),
            "map_change" => Some(EventType::MapChange),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Something notable that happened on a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    pub world_id: String,
    pub map_id: Option<String>,
    pub turn_number: i64,
    pub event_type: EventType,
    pub title: String,
    pub description: String,
    pub data: Option<Value>,
    pub created_at: i64,
}

impl TimelineEvent {
    /// Create a new event stamped now
    pub fn new(
        world_id: impl Into<String>,
        turn_number: i64,
        event_type: EventType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            world_id: world_id.into(),
            map_id: None,
            turn_number,
            event_type,
            title: title.into(),
            description: String::new(),
            data: None,
            created_at: now_ms(),
        }
    }
}

/// Turn bounds and row limit for event queries. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub limit: Option<usize>,
}

impl EventRange {
    /// Inclusive turn range
    pub fn turns(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            limit: None,
        }
    }

    /// Cap the number of rows returned
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// Database operations
impl Database {
    /// Append an event
    pub fn add_timeline_event(&self, event: &TimelineEvent) -> Result<()> {
        if event.turn_number < 0 {
            anyhow::bail!("turn number must be non-negative, got {}", event.turn_number);
        }
        let data = event
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to serialize event data")?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO timeline_events
                (id, world_id, map_id, turn_number, event_type, title, description, event_data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                event.id,
                event.world_id,
                event.map_id,
                event.turn_number,
                event.event_type.as_str(),
                event.title,
                event.description,
                data,
                event.created_at,
            ],
        )
        .context("failed to insert timeline event")?;
        tracing::debug!(id = %event.id, kind = %event.event_type, turn = event.turn_number, "logged event");
        Ok(())
    }

    /// Events for a world, ordered by (turn asc, creation asc).
    /// The limit counts only events with a known type.
    pub fn get_timeline_events(&self, world_id: &str, range: EventRange) -> Result<Vec<TimelineEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
            SELECT id, world_id, map_id, turn_number, event_type, title, description, event_data, created_at
            FROM timeline_events
            WHERE world_id = ?1
              AND (?2 IS NULL OR turn_number >= ?2)
              AND (?3 IS NULL OR turn_number <= ?3)
            ORDER BY turn_number ASC, created_at ASC, rowid ASC
            "#,
            )
            .context("failed to prepare timeline query")?;

        let raw = stmt
            .query(params![world_id, range.start, range.end])?
            .mapped(|row| {
                Ok((
                    row.get::<_, String>(4)?,
                    TimelineEvent {
                        id: row.get(0)?,
                        world_id: row.get(1)?,
                        map_id: row.get(2)?,
                        turn_number: row.get(3)?,
                        event_type: EventType::TurnStart,
                        title: row.get(5)?,
                        description: row.get(6)?,
                        data: decode_json(row.get(7)?, "event_data"),
                        created_at: row.get(8)?,
                    },
                ))
            })
            .collect::<Result<Vec<_>, _>>()
            .context("failed to list timeline events")?;

        let events = raw
            .into_iter()
            .filter_map(|(kind, mut event)| match EventType::parse(&kind) {
                Some(event_type) => {
                    event.event_type = event_type;
                    Some(event)
                }
                None => {
                    tracing::warn!(id = %event.id, kind = %kind, "skipping event with unknown type");
                    None
                }
            })
            .take(range.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(events)
    }

    /// Highest turn with a logged event, 0 if none
    pub fn get_max_turn_number(&self, world_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(turn_number) FROM timeline_events WHERE world_id = ?1",
                params![world_id],
                |row| row.get(0),
            )
            .context("failed to get max turn number")?;
        Ok(max.unwrap_or(0))
    }
}
