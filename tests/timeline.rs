//! Integration tests for the turn engine
//!
//! Drives a world through turns, moves and scrubbing using only the public
//! API, against in-memory and on-disk databases.

use anyhow::Result;
use std::sync::Arc;

use turnwarden::db::events::{EventRange, EventType, TimelineEvent};
use turnwarden::db::history::PositionSource;
use turnwarden::db::maps::Map;
use turnwarden::db::tokens::{MapToken, Token};
use turnwarden::db::worlds::World;
use turnwarden::db::Database;
use turnwarden::timeline::{Timeline, TimelineError, TimelineExport};

// ============================================================================
// Helpers
// ============================================================================

struct Campaign {
    db: Arc<Database>,
    world: World,
    map: Map,
}

fn campaign() -> Result<Campaign> {
    let db = Arc::new(Database::in_memory()?);
    let world = World::new("Barovia").with_description("Mists everywhere");
    db.create_world(&world, None)?;
    let map = Map::new(Some(&world.id), "Village", "maps/village.png");
    db.insert_map(&map)?;
    Ok(Campaign { db, world, map })
}

fn placement(c: &Campaign, name: &str, initiative: i64) -> Result<MapToken> {
    let token = Token::new(name, format!("tokens/{}.png", name)).with_hp(20);
    c.db.insert_token(&token)?;
    let pt = MapToken::new(&c.map.id, &token, 0, 0).with_initiative(initiative);
    c.db.insert_map_token(&pt)?;
    Ok(pt)
}

fn timeline(c: &Campaign) -> Result<Timeline> {
    let mut timeline = Timeline::load(c.db.clone(), &c.world.id)?;
    timeline.select_map(&c.map.id)?;
    Ok(timeline)
}

// ============================================================================
// Turn cursor
// ============================================================================

#[test]
fn turns_increase_by_one() -> Result<()> {
    let c = campaign()?;
    let mut timeline = timeline(&c)?;

    for expected in 1..=6 {
        timeline.advance_turn()?;
        assert_eq!(timeline.current_turn(), expected);
        assert!(timeline.max_turn() >= timeline.current_turn());
    }
    Ok(())
}

#[test]
fn scrubbing_rejects_every_mutation() -> Result<()> {
    let c = campaign()?;
    let pt = placement(&c, "strahd", 18)?;
    let mut timeline = timeline(&c)?;
    timeline.advance_turn()?;
    timeline.update_token_position(&pt.id, 4, 4, Some("Strahd"))?;
    timeline.advance_turn()?;

    let events_before = c.db.get_timeline_events(&c.world.id, EventRange::default())?;
    timeline.scrub_to(1)?;

    assert!(matches!(
        timeline.update_token_position(&pt.id, 9, 9, Some("Strahd")),
        Err(TimelineError::Scrubbing { .. })
    ));
    assert!(matches!(
        timeline.save_token_state(&pt.id, 9, 9, Some(1), None),
        Err(TimelineError::Scrubbing { .. })
    ));
    assert!(matches!(
        timeline.log_event(EventType::NoteAdd, "sneaky", None, ""),
        Err(TimelineError::Scrubbing { .. })
    ));
    assert!(matches!(
        timeline.advance_turn(),
        Err(TimelineError::Scrubbing { .. })
    ));

    let live = c.db.get_map_token(&pt.id)?.expect("placement");
    assert_eq!((live.x, live.y), (4, 4));
    let latest = c.db.get_token_position_at_turn(&pt.id, 2)?.expect("snapshot");
    assert_eq!(latest.turn_number, 1);
    let events_after = c.db.get_timeline_events(&c.world.id, EventRange::default())?;
    assert_eq!(events_before, events_after);

    timeline.exit_scrub();
    assert_eq!(timeline.cursor().scrub_turn(), timeline.current_turn());
    assert_eq!(timeline.display_turn(), 2);
    Ok(())
}

#[test]
fn scrub_is_clamped_to_known_turns() -> Result<()> {
    let c = campaign()?;
    let mut timeline = timeline(&c)?;
    timeline.advance_turn()?;
    timeline.advance_turn()?;

    timeline.scrub_to(40)?;
    assert_eq!(timeline.display_turn(), 2);
    timeline.scrub_to(-5)?;
    assert_eq!(timeline.display_turn(), 0);
    assert_eq!(timeline.current_turn(), 2);
    Ok(())
}

// ============================================================================
// Initiative
// ============================================================================

#[test]
fn initiative_order_and_rotation() -> Result<()> {
    let c = campaign()?;
    let a = placement(&c, "a", 15)?;
    let b = placement(&c, "b", 20)?;
    let cc = placement(&c, "c", 20)?;
    placement(&c, "d", 0)?;
    let mut timeline = timeline(&c)?;

    // b and c tie and go by placement id; d never acts
    let mut tied = vec![b.id.clone(), cc.id.clone()];
    tied.sort();
    let order = timeline.initiative_order().to_vec();
    assert_eq!(order, vec![tied[0].clone(), tied[1].clone(), a.id.clone()]);

    let first = timeline.advance_turn()?;
    assert_eq!(first.as_deref(), Some(order[0].as_str()));
    timeline.advance_turn()?;
    timeline.advance_turn()?;
    let fourth = timeline.advance_turn()?;
    assert_eq!(fourth, first);
    Ok(())
}

#[test]
fn initiative_follows_placement_changes() -> Result<()> {
    let c = campaign()?;
    let a = placement(&c, "a", 10)?;
    let mut timeline = timeline(&c)?;

    let token = Token::new("late", "tokens/late.png");
    c.db.insert_token(&token)?;
    let late = timeline.place_token(&token, 3, 3, Some(25))?;
    assert_eq!(timeline.initiative_order(), [late.id.clone(), a.id.clone()]);

    timeline.set_token_initiative(&a.id, 30)?;
    assert_eq!(timeline.initiative_order(), [a.id.clone(), late.id.clone()]);

    timeline.remove_token(&late.id)?;
    assert_eq!(timeline.initiative_order(), [a.id.clone()]);
    Ok(())
}

// ============================================================================
// Position history
// ============================================================================

#[test]
fn history_upsert_keeps_latest() -> Result<()> {
    let c = campaign()?;
    let pt = placement(&c, "ireena", 12)?;
    let mut timeline = timeline(&c)?;
    for _ in 0..5 {
        timeline.advance_turn()?;
    }

    timeline.save_token_state(&pt.id, 3, 4, None, None)?;
    timeline.save_token_state(&pt.id, 7, 8, Some(11), None)?;

    let snap = c.db.get_token_position_at_turn(&pt.id, 5)?.expect("snapshot");
    assert_eq!(snap.turn_number, 5);
    assert_eq!((snap.x, snap.y), (7, 8));
    assert_eq!(snap.hp, Some(11));
    Ok(())
}

#[test]
fn as_of_queries() -> Result<()> {
    let c = campaign()?;
    let pt = placement(&c, "ismark", 9)?;

    c.db.save_token_position(&pt.id, 2, 1, 1, None, None)?;
    c.db.save_token_position(&pt.id, 5, 2, 2, None, None)?;

    let at4 = c.db.get_token_position_at_turn(&pt.id, 4)?.expect("turn 2");
    assert_eq!((at4.turn_number, at4.x), (2, 1));
    let at5 = c.db.get_token_position_at_turn(&pt.id, 5)?.expect("turn 5");
    assert_eq!((at5.turn_number, at5.x), (5, 2));
    assert!(c.db.get_token_position_at_turn(&pt.id, 1)?.is_none());
    Ok(())
}

#[test]
fn board_merges_history_and_live_rows() -> Result<()> {
    let c = campaign()?;
    let tracked = placement(&c, "tracked", 5)?;
    let untracked = placement(&c, "untracked", 4)?;
    let mut timeline = timeline(&c)?;

    timeline.advance_turn()?;
    timeline.update_token_position(&tracked.id, 2, 2, None)?;
    timeline.advance_turn()?;
    timeline.update_token_position(&tracked.id, 6, 6, None)?;

    let board = timeline.scrub_to(1)?;
    let t = board.iter().find(|b| b.map_token_id == tracked.id).expect("tracked");
    let u = board.iter().find(|b| b.map_token_id == untracked.id).expect("untracked");
    assert_eq!((t.x, t.y, t.source), (2, 2, PositionSource::Snapshot(1)));
    assert_eq!((u.x, u.y, u.source), (0, 0, PositionSource::Live));
    assert_eq!(u.hp, Some(20));
    Ok(())
}

#[test]
fn movement_flags_reset_on_advance() -> Result<()> {
    let c = campaign()?;
    let a = placement(&c, "a", 3)?;
    let b = placement(&c, "b", 2)?;
    let mut timeline = timeline(&c)?;
    timeline.advance_turn()?;

    timeline.update_token_position(&a.id, 1, 0, None)?;
    timeline.update_token_position(&b.id, 0, 1, None)?;
    assert!(c.db.get_map_token(&a.id)?.expect("a").has_moved);

    timeline.advance_turn()?;
    for pt in c.db.list_map_tokens(&c.map.id)? {
        assert!(!pt.has_moved, "{} still marked as moved", pt.id);
        assert_eq!(pt.current_turn, 2);
    }
    Ok(())
}

#[test]
fn advance_survives_placement_deleted_behind_its_back() -> Result<()> {
    let c = campaign()?;
    let gone = placement(&c, "gone", 20)?;
    let stays = placement(&c, "stays", 5)?;
    let mut timeline = timeline(&c)?;
    assert_eq!(timeline.initiative_order()[0], gone.id);

    c.db.delete_map_token(&gone.id)?;

    timeline.advance_turn()?;
    timeline.advance_turn()?;
    assert_eq!(timeline.current_turn(), 2);
    let saved = c.db.get_game_state(&c.world.id)?.expect("state");
    assert_eq!(saved.current_turn, 2);

    timeline.reload_initiative()?;
    assert_eq!(timeline.initiative_order(), [stays.id.clone()]);
    assert_eq!(timeline.advance_turn()?, Some(stays.id.clone()));
    Ok(())
}

#[test]
fn advance_and_reload_survive_map_deleted_behind_its_back() -> Result<()> {
    let c = campaign()?;
    placement(&c, "lonely", 7)?;
    let mut timeline = timeline(&c)?;
    timeline.advance_turn()?;

    c.db.delete_map(&c.map.id)?;
    timeline.advance_turn()?;
    assert_eq!(c.db.get_game_state(&c.world.id)?.expect("state").current_turn, 2);

    let reloaded = Timeline::load(c.db.clone(), &c.world.id)?;
    assert_eq!(reloaded.current_turn(), 2);
    assert_eq!(reloaded.map_id(), None);
    assert!(reloaded.initiative_order().is_empty());
    Ok(())
}

#[test]
fn board_cache_never_stale_after_move() -> Result<()> {
    let c = campaign()?;
    let pt = placement(&c, "van-richten", 8)?;
    let mut timeline = timeline(&c)?;
    timeline.advance_turn()?;

    timeline.update_token_position(&pt.id, 1, 1, None)?;
    assert_eq!(timeline.positions_at_turn(1)?[0].x, 1);
    // Warm the cache, then mutate
    assert_eq!(timeline.positions_at_turn(1)?[0].x, 1);

    timeline.update_token_position(&pt.id, 5, 1, None)?;
    assert_eq!(timeline.positions_at_turn(1)?[0].x, 5);

    timeline.save_token_state(&pt.id, 7, 1, None, None)?;
    assert_eq!(timeline.positions_at_turn(1)?[0].x, 7);
    Ok(())
}

// ============================================================================
// Event log
// ============================================================================

#[test]
fn events_come_back_in_turn_order() -> Result<()> {
    let c = campaign()?;
    for turn in [3, 1, 2] {
        let event = TimelineEvent::new(&c.world.id, turn, EventType::Combat, format!("turn {}", turn));
        c.db.add_timeline_event(&event)?;
    }

    let turns: Vec<_> = c
        .db
        .get_timeline_events(&c.world.id, EventRange::default())?
        .iter()
        .map(|e| e.turn_number)
        .collect();
    assert_eq!(turns, vec![1, 2, 3]);
    assert_eq!(c.db.get_max_turn_number(&c.world.id)?, 3);
    Ok(())
}

#[test]
fn export_round_trips() -> Result<()> {
    let c = campaign()?;
    let pt = placement(&c, "ezmerelda", 16)?;
    let mut timeline = timeline(&c)?;
    timeline.advance_turn()?;
    timeline.update_token_position(&pt.id, 2, 3, Some("Ezmerelda"))?;
    timeline.log_token_action(&pt.id, "Ezmerelda", "draws her sword", "attack")?;
    timeline.log_combat_event("Ezmerelda", "Zombie", Some(9), true)?;

    let json = timeline.export(None, None)?.to_json()?;
    let restored = TimelineExport::from_json(&json)?;

    assert_eq!(restored.world_id, c.world.id);
    assert_eq!(restored.current_turn, 1);
    let kinds: Vec<_> = restored.events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::TurnStart,
            EventType::TokenMove,
            EventType::TokenAction,
            EventType::Combat
        ]
    );
    assert_eq!(restored.events, c.db.get_timeline_events(&c.world.id, EventRange::default())?);
    Ok(())
}

#[test]
fn statistics_over_a_session() -> Result<()> {
    let c = campaign()?;
    let mut timeline = timeline(&c)?;
    timeline.advance_turn()?;
    timeline.advance_turn()?;
    timeline.log_location_discovered("Old Bonegrinder", "windmill")?;
    timeline.log_combat_event("Hag", "Ireena", None, false)?;
    timeline.advance_turn()?;

    let stats = timeline.statistics()?;
    assert_eq!(stats.total_turns, 3);
    assert_eq!(stats.total_events, 5);
    assert_eq!(stats.events_by_type.get(&EventType::TurnStart), Some(&3));
    assert_eq!(stats.most_active_turn, Some(2));
    assert_eq!(stats.most_active_turn_events, 3);
    Ok(())
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn session_survives_reopen() -> Result<()> {
    let path = std::env::temp_dir().join(format!("turnwarden-{}.db", turnwarden::db::new_id()));
    let (world_id, map_id, pt_id) = {
        let db = Arc::new(Database::open(&path)?);
        let world = World::new("Ravenloft");
        db.create_world(&world, None)?;
        let map = Map::new(Some(&world.id), "Castle", "maps/castle.png");
        db.insert_map(&map)?;
        let token = Token::new("Rahadin", "tokens/rahadin.png");
        db.insert_token(&token)?;
        let pt = MapToken::new(&map.id, &token, 0, 0).with_initiative(14);
        db.insert_map_token(&pt)?;

        let mut timeline = Timeline::load(db.clone(), &world.id)?;
        timeline.select_map(&map.id)?;
        timeline.advance_turn()?;
        timeline.update_token_position(&pt.id, 5, 5, Some("Rahadin"))?;
        timeline.advance_turn()?;
        (world.id, map.id, pt.id)
    };

    let db = Arc::new(Database::open(&path)?);
    let mut timeline = Timeline::load(db, &world_id)?;
    assert_eq!(timeline.current_turn(), 2);
    assert_eq!(timeline.map_id(), Some(map_id.as_str()));
    assert_eq!(timeline.initiative_order(), [pt_id.clone()]);
    assert_eq!(timeline.events_for_turn(1).len(), 2);

    let board = timeline.scrub_to(1)?;
    assert_eq!((board[0].x, board[0].y), (5, 5));

    std::fs::remove_file(&path)?;
    Ok(())
}
