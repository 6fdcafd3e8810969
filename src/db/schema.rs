//! Database schema definitions
//!
//! All CREATE TABLE statements for the turnwarden database.
//! Uses UUIDv7 for primary keys (time-sortable) and Unix milliseconds for timestamps.

/// Schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
--------------------------------------------------------------------------------
-- WORLDS
-- Top-level campaign container. Owns maps, timeline events, and game state.
--------------------------------------------------------------------------------

CREATE TABLE IF NOT EXISTS worlds (
    id TEXT PRIMARY KEY,                    -- UUIDv7
    name TEXT UNIQUE NOT NULL,
    description TEXT,
    created_at INTEGER NOT NULL,            -- Unix timestamp ms
    last_accessed INTEGER                   -- NULL until first load
);

--------------------------------------------------------------------------------
-- MAPS
-- Playable surfaces. world_id NULL = unassigned. parent_map_id forms a tree.
--------------------------------------------------------------------------------

CREATE TABLE IF NOT EXISTS maps (
    id TEXT PRIMARY KEY,                    -- UUIDv7
    world_id TEXT,
    parent_map_id TEXT,
    name TEXT NOT NULL,
    image_path TEXT NOT NULL,
    grid_size INTEGER NOT NULL DEFAULT 50,
    grid_enabled INTEGER NOT NULL DEFAULT 1,
    grid_color TEXT NOT NULL DEFAULT '#FFFFFF',
    grid_style TEXT NOT NULL DEFAULT 'dashed',
    grid_opacity REAL NOT NULL DEFAULT 0.7,
    map_scale REAL NOT NULL DEFAULT 1.0,
    width INTEGER NOT NULL DEFAULT 0,       -- pixels
    height INTEGER NOT NULL DEFAULT 0,      -- pixels
    map_type TEXT NOT NULL DEFAULT 'world', -- 'world', 'location', 'dungeon', ...
    created_at INTEGER NOT NULL,
    FOREIGN KEY (world_id) REFERENCES worlds(id) ON DELETE SET NULL,
    FOREIGN KEY (parent_map_id) REFERENCES maps(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_maps_world ON maps(world_id);
CREATE INDEX IF NOT EXISTS idx_maps_parent ON maps(parent_map_id);

--------------------------------------------------------------------------------
-- TOKENS
-- Reusable actor templates
--------------------------------------------------------------------------------

CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,                    -- UUIDv7
    name TEXT NOT NULL,
    image_path TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 1,        -- grid cells
    color TEXT NOT NULL DEFAULT '255,0,0',
    token_type TEXT NOT NULL DEFAULT 'character',
    notes TEXT,
    initiative INTEGER NOT NULL DEFAULT 0,  -- default for new placements
    max_hp INTEGER NOT NULL DEFAULT 10,
    current_hp INTEGER NOT NULL DEFAULT 10,
    created_at INTEGER NOT NULL
);

--------------------------------------------------------------------------------
-- MAP_TOKENS
-- Placements of a token template on a map. Unit of initiative and history.
--------------------------------------------------------------------------------

CREATE TABLE IF NOT EXISTS map_tokens (
    id TEXT PRIMARY KEY,                    -- UUIDv7
    map_id TEXT NOT NULL,
    token_id TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    rotation INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    initiative INTEGER NOT NULL DEFAULT 0,
    has_moved INTEGER NOT NULL DEFAULT 0,
    current_turn INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (map_id) REFERENCES maps(id) ON DELETE CASCADE,
    FOREIGN KEY (token_id) REFERENCES tokens(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_map_tokens_map ON map_tokens(map_id);

CREATE TABLE IF NOT EXISTS token_actions (
    id TEXT PRIMARY KEY,                    -- UUIDv7
    map_token_id TEXT NOT NULL,
    turn_number INTEGER NOT NULL CHECK (turn_number >= 0),
    action_text TEXT NOT NULL,
    action_type TEXT NOT NULL DEFAULT 'custom',
    created_at INTEGER NOT NULL,
    FOREIGN KEY (map_token_id) REFERENCES map_tokens(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_token_actions_token ON token_actions(map_token_id, turn_number);

--------------------------------------------------------------------------------
-- TOKEN_POSITION_HISTORY
-- One snapshot per (placement, turn). Later writes replace earlier ones.
--------------------------------------------------------------------------------

CREATE TABLE IF NOT EXISTS token_position_history (
    id TEXT PRIMARY KEY,                    -- UUIDv7
    map_token_id TEXT NOT NULL,
    turn_number INTEGER NOT NULL CHECK (turn_number >= 0),
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    hp INTEGER,
    status_effects TEXT,                    -- JSON array of strings
    created_at INTEGER NOT NULL,
    UNIQUE (map_token_id, turn_number),
    FOREIGN KEY (map_token_id) REFERENCES map_tokens(id) ON DELETE CASCADE
);

--------------------------------------------------------------------------------
-- TIMELINE_EVENTS
-- Append-only per-world event log
--------------------------------------------------------------------------------

CREATE TABLE IF NOT EXISTS timeline_events (
    id TEXT PRIMARY KEY,                    -- UUIDv7
    world_id TEXT NOT NULL,
    map_id TEXT,
    turn_number INTEGER NOT NULL DEFAULT 0 CHECK (turn_number >= 0),
    event_type TEXT NOT NULL,               -- 'turn_start', 'token_move', 'combat', ...
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    event_data TEXT,                        -- JSON object
    created_at INTEGER NOT NULL,
    FOREIGN KEY (world_id) REFERENCES worlds(id) ON DELETE CASCADE,
    FOREIGN KEY (map_id) REFERENCES maps(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_timeline_world_turn
    ON timeline_events(world_id, turn_number, created_at);

--------------------------------------------------------------------------------
-- GAME_STATE
-- Singleton cursor snapshot per world. current_map_id and active_token_id
-- are soft references: the map or placement may be gone by the next load.
--------------------------------------------------------------------------------

CREATE TABLE IF NOT EXISTS game_state (
    world_id TEXT PRIMARY KEY,
    current_turn INTEGER NOT NULL DEFAULT 0 CHECK (current_turn >= 0),
    current_map_id TEXT,
    active_token_id TEXT,
    state_data TEXT,                        -- JSON
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (world_id) REFERENCES worlds(id) ON DELETE CASCADE
);
"#;
