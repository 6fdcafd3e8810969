//! Map CRUD operations
//!
//! Maps may belong to a world or float unassigned, and nest via parent_map_id.

use super::{new_id, now_ms, Database};
use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A playable map surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub id: String,
    pub world_id: Option<String>,
    pub parent_map_id: Option<String>,
    pub name: String,
    pub image_path: String,

    // Grid overlay
    pub grid_size: i64,
    pub grid_enabled: bool,
    pub grid_color: String,
    pub grid_style: String,
    pub grid_opacity: f64,
    pub map_scale: f64,

    // Pixel dimensions of the image
    pub width: i64,
    pub height: i64,

    pub map_type: String,
    pub created_at: i64,
}

impl Map {
    /// Create a new map with default grid settings
    pub fn new(
        world_id: Option<&str>,
        name: impl Into<String>,
        image_path: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            world_id: world_id.map(str::to_string),
            parent_map_id: None,
            name: name.into(),
            image_path: image_path.into(),
            grid_size: 50,
            grid_enabled: true,
            grid_color: "#FFFFFF".to_string(),
            grid_style: "dashed".to_string(),
            grid_opacity: 0.7,
            map_scale: 1.0,
            width: 0,
            height: 0,
            map_type: "world".to_string(),
            created_at: now_ms(),
        }
    }
}

/// A map with its sub-maps, recursively
#[derive(Debug, Clone, Serialize)]
pub struct MapNode {
    pub map: Map,
    pub children: Vec<MapNode>,
}

const MAP_COLUMNS: &str = "id, world_id, parent_map_id, name, image_path,
    grid_size, grid_enabled, grid_color, grid_style, grid_opacity, map_scale,
    width, height, map_type, created_at";

// Database operations
impl Database {
    /// Insert a new map
    pub fn insert_map(&self, map: &Map) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO maps ({MAP_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                map.id,
                map.world_id,
                map.parent_map_id,
                map.name,
                map.image_path,
                map.grid_size,
                map.grid_enabled as i32,
                map.grid_color,
                map.grid_style,
                map.grid_opacity,
                map.map_scale,
                map.width,
                map.height,
                map.map_type,
                map.created_at,
            ],
        )
        .context("failed to insert map")?;
        Ok(())
    }

    /// Overwrite an existing map's settings
    pub fn update_map(&self, map: &Map) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                r#"
                UPDATE maps SET
                    world_id = ?2, parent_map_id = ?3, name = ?4, image_path = ?5,
                    grid_size = ?6, grid_enabled = ?7, grid_color = ?8, grid_style = ?9,
                    grid_opacity = ?10, map_scale = ?11, width = ?12, height = ?13,
                    map_type = ?14
                WHERE id = ?1
                "#,
                params![
                    map.id,
                    map.world_id,
                    map.parent_map_id,
                    map.name,
                    map.image_path,
                    map.grid_size,
                    map.grid_enabled as i32,
                    map.grid_color,
                    map.grid_style,
                    map.grid_opacity,
                    map.map_scale,
                    map.width,
                    map.height,
                    map.map_type,
                ],
            )
            .context("failed to update map")?;
        if updated == 0 {
            anyhow::bail!("map {} not found", map.id);
        }
        Ok(())
    }

    /// Get map by ID
    pub fn get_map(&self, id: &str) -> Result<Option<Map>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {MAP_COLUMNS} FROM maps WHERE id = ?1"))
            .context("failed to prepare map query")?;

        let map = stmt
            .query_row(params![id], Self::map_from_sqlite)
            .optional()
            .context("failed to query map")?;

        Ok(map)
    }

    /// List maps in a world, by name
    pub fn list_maps(&self, world_id: &str) -> Result<Vec<Map>> {
        self.query_maps("WHERE world_id = ?1 ORDER BY name", world_id)
    }

    /// List maps not assigned to any world
    pub fn list_unassigned_maps(&self) -> Result<Vec<Map>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MAP_COLUMNS} FROM maps WHERE world_id IS NULL ORDER BY name"
            ))
            .context("failed to prepare unassigned maps query")?;

        let maps = stmt
            .query([])?
            .mapped(Self::map_from_sqlite)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to list unassigned maps")?;

        Ok(maps)
    }

    /// Move a map into a world (or out of all worlds with `None`)
    pub fn assign_map_to_world(&self, map_id: &str, world_id: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE maps SET world_id = ?1 WHERE id = ?2",
            params![world_id, map_id],
        )
        .context("failed to assign map")?;
        Ok(())
    }

    /// Create a sub-map under a parent. The child inherits the parent's world.
    pub fn create_sub_map(
        &self,
        parent_map_id: &str,
        name: impl Into<String>,
        image_path: impl Into<String>,
        map_type: impl Into<String>,
    ) -> Result<Map> {
        let parent = self
            .get_map(parent_map_id)?
            .with_context(|| format!("parent map {} not found", parent_map_id))?;

        let mut map = Map::new(parent.world_id.as_deref(), name, image_path);
        map.parent_map_id = Some(parent.id);
        map.map_type = map_type.into();
        self.insert_map(&map)?;
        Ok(map)
    }

    /// List direct children of a map
    pub fn list_sub_maps(&self, parent_map_id: &str) -> Result<Vec<Map>> {
        self.query_maps("WHERE parent_map_id = ?1 ORDER BY name", parent_map_id)
    }

    /// Build the map tree for a world, rooted at maps without a parent
    pub fn map_hierarchy(&self, world_id: &str) -> Result<Vec<MapNode>> {
        let all = self.list_maps(world_id)?;
        let (roots, rest): (Vec<Map>, Vec<Map>) =
            all.into_iter().partition(|m| m.parent_map_id.is_none());

        fn attach(map: Map, pool: &[Map]) -> MapNode {
            let children = pool
                .iter()
                .filter(|m| m.parent_map_id.as_deref() == Some(map.id.as_str()))
                .cloned()
                .map(|child| attach(child, pool))
                .collect();
            MapNode { map, children }
        }

        Ok(roots.into_iter().map(|root| attach(root, &rest)).collect())
    }

    /// Delete a map (cascades to sub-maps and placements)
    pub fn delete_map(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM maps WHERE id = ?1", params![id])
            .context("failed to delete map")?;
        Ok(())
    }

    fn query_maps(&self, clause: &str, arg: &str) -> Result<Vec<Map>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {MAP_COLUMNS} FROM maps {clause}"))
            .context("failed to prepare maps query")?;

        let maps = stmt
            .query(params![arg])?
            .mapped(Self::map_from_sqlite)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to list maps")?;

        Ok(maps)
    }

    fn map_from_sqlite(row: &rusqlite::Row) -> rusqlite::Result<Map> {
        Ok(Map {
            id: row.get(0)?,
            world_id: row.get(1)?,
            parent_map_id: row.get(2)?,
            name: row.get(3)?,
            image_path: row.get(4)?,
            grid_size: row.get(5)?,
            grid_enabled: row.get::<_, i32>(6)? != 0,
            grid_color: row.get(7)?,
            grid_style: row.get(8)?,
            grid_opacity: row.get(9)?,
            map_scale: row.get(10)?,
            width: row.get(11)?,
            height: row.get(12)?,
            map_type: row.get(13)?,
            created_at: row.get(14)?,
        })
    }
}
