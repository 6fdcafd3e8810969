//! World CRUD operations
//!
//! Worlds are campaign containers. Deleting one orphans its maps rather than
//! deleting them; its timeline and game state go with it.

use super::{new_id, now_ms, Database};
use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A campaign world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub last_accessed: Option<i64>,
}

impl World {
    /// Create a new world
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: None,
            created_at: now_ms(),
            last_accessed: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

const WORLD_COLUMNS: &str = "id, name, description, created_at, last_accessed";

// Database operations
impl Database {
    /// Insert a world, optionally claiming an existing map for it.
    ///
    /// Fails if a world with the same name already exists.
    pub fn create_world(&self, world: &World, active_map_id: Option<&str>) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute(
            "INSERT INTO worlds (id, name, description, created_at, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                world.id,
                world.name,
                world.description,
                world.created_at,
                world.last_accessed
            ],
        )
        .with_context(|| format!("failed to insert world '{}'", world.name))?;

        if let Some(map_id) = active_map_id {
            tx.execute(
                "UPDATE maps SET world_id = ?1 WHERE id = ?2",
                params![world.id, map_id],
            )
            .context("failed to assign map to new world")?;
        }

        tx.commit().context("failed to commit world creation")?;
        tracing::info!(world = %world.name, id = %world.id, "created world");
        Ok(())
    }

    /// Get world by ID
    pub fn get_world(&self, id: &str) -> Result<Option<World>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {WORLD_COLUMNS} FROM worlds WHERE id = ?1"))
            .context("failed to prepare world query")?;

        let world = stmt
            .query_row(params![id], Self::world_from_sqlite)
            .optional()
            .context("failed to query world")?;

        Ok(world)
    }

    /// List all worlds, most recently accessed first
    pub fn list_worlds(&self) -> Result<Vec<World>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WORLD_COLUMNS} FROM worlds
                 ORDER BY COALESCE(last_accessed, created_at) DESC, name"
            ))
            .context("failed to prepare worlds query")?;

        let worlds = stmt
            .query([])?
            .mapped(Self::world_from_sqlite)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to list worlds")?;

        Ok(worlds)
    }

    /// Load a world, touching its last-accessed timestamp
    pub fn load_world(&self, id: &str) -> Result<Option<World>> {
        {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE worlds SET last_accessed = ?1 WHERE id = ?2",
                params![now_ms(), id],
            )
            .context("failed to touch world")?;
        }
        self.get_world(id)
    }

    /// Check whether a world name is taken
    pub fn world_name_exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM worlds WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .context("failed to check world name")?;
        Ok(count > 0)
    }

    /// Delete a world. Its maps become unassigned.
    pub fn delete_world(&self, id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;
        let orphaned = tx
            .execute("UPDATE maps SET world_id = NULL WHERE world_id = ?1", params![id])
            .context("failed to unassign maps")?;
        tx.execute("DELETE FROM timeline_events WHERE world_id = ?1", params![id])
            .context("failed to delete world events")?;
        tx.execute("DELETE FROM game_state WHERE world_id = ?1", params![id])
            .context("failed to delete world game state")?;
        tx.execute("DELETE FROM worlds WHERE id = ?1", params![id])
            .context("failed to delete world")?;
        tx.commit().context("failed to commit world deletion")?;
        tracing::info!(id, orphaned, "deleted world");
        Ok(())
    }

    fn world_from_sqlite(row: &rusqlite::Row) -> rusqlite::Result<World> {
        Ok(World {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            last_accessed: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::maps::Map;

    #[test]
    fn test_world_crud() -> Result<()> {
        let db = Database::in_memory()?;

        let world = World::new("Greyhawk").with_description("classic");
        db.create_world(&world, None)?;

        let fetched = db.get_world(&world.id)?.expect("world should exist");
        assert_eq!(fetched.name, "Greyhawk");
        assert_eq!(fetched.description.as_deref(), Some("classic"));
        assert!(fetched.last_accessed.is_none());

        let loaded = db.load_world(&world.id)?.expect("world should load");
        assert!(loaded.last_accessed.is_some());

        assert!(db.world_name_exists("Greyhawk")?);
        assert!(!db.world_name_exists("Eberron")?);

        assert_eq!(db.list_worlds()?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_duplicate_world_name_rejected() -> Result<()> {
        let db = Database::in_memory()?;
        db.create_world(&World::new("Faerun"), None)?;
        assert!(db.create_world(&World::new("Faerun"), None).is_err());
        assert_eq!(db.list_worlds()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_create_world_claims_map() -> Result<()> {
        let db = Database::in_memory()?;
        let map = Map::new(None, "Loose Map", "maps/loose.png");
        db.insert_map(&map)?;
        assert_eq!(db.list_unassigned_maps()?.len(), 1);

        let world = World::new("Krynn");
        db.create_world(&world, Some(&map.id))?;

        assert!(db.list_unassigned_maps()?.is_empty());
        assert_eq!(db.list_maps(&world.id)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_delete_world_orphans_maps() -> Result<()> {
        let db = Database::in_memory()?;
        let world = World::new("Doomed");
        db.create_world(&world, None)?;
        let map = Map::new(Some(&world.id), "Survivor", "maps/survivor.png");
        db.insert_map(&map)?;

        db.delete_world(&world.id)?;

        assert!(db.get_world(&world.id)?.is_none());
        let orphan = db.get_map(&map.id)?.expect("map should survive");
        assert!(orphan.world_id.is_none());
        Ok(())
    }
}
