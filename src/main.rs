//! turnwarden - turn tracking and timeline history for tabletop campaigns
//!
//! Usage:
//!   turnwarden worlds
//!   turnwarden create-world <name> [description]
//!   turnwarden stats <world-id>
//!   turnwarden export <world-id> [start-turn] [end-turn]
//!   turnwarden board <map-id> [turn]
//!   turnwarden roll <expr>

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;

use turnwarden::config::Config;
use turnwarden::db::history::PositionSource;
use turnwarden::db::worlds::World;
use turnwarden::db::{format_timestamp, Database};
use turnwarden::dice::DiceRoller;
use turnwarden::paths::Paths;
use turnwarden::timeline::Timeline;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("turnwarden=info".parse()?),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    let paths = Paths::from_env();
    let config = Config::load(&paths.config)?;

    match args[1].as_str() {
        "roll" => return cmd_roll(&config, &args[2..]),
        "help" | "--help" | "-h" => {
            print_usage();
            return Ok(());
        }
        _ => {}
    }

    paths.prepare_db_dir()?;
    tracing::debug!(db = %paths.db.display(), config = %paths.config.display(), "resolved paths");
    let db = Arc::new(Database::open(&paths.db).context("failed to open database")?);

    match args[1].as_str() {
        "worlds" => cmd_worlds(&db)?,
        "create-world" => cmd_create_world(&db, &args[2..])?,
        "stats" => cmd_stats(db, &config, &args[2..])?,
        "export" => cmd_export(db, &config, &args[2..])?,
        "board" => cmd_board(&db, &args[2..])?,
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_usage() {
    let paths = Paths::from_env();
    eprintln!(
        r#"turnwarden - Turn tracking and timeline history for tabletop campaigns

Usage:
  turnwarden worlds
  turnwarden create-world <name> [description]
  turnwarden stats <world-id>
  turnwarden export <world-id> [start-turn] [end-turn]
  turnwarden board <map-id> [turn]
  turnwarden roll <expr>

Environment:
  TURNWARDEN_DB      Override database path
  TURNWARDEN_CONFIG  Override config path

Paths:
  DB:     {db}
  Config: {config}

Examples:
  turnwarden create-world "Greyhawk" "Temple of Elemental Evil"
  turnwarden board 01933f2a-... 4
  turnwarden roll 2d6+3
"#,
        db = paths.db.display(),
        config = paths.config.display(),
    );
}

fn parse_turn(arg: Option<&String>) -> Result<Option<i64>> {
    arg.map(|s| {
        s.parse::<i64>()
            .with_context(|| format!("invalid turn number: {}", s))
    })
    .transpose()
}

fn cmd_worlds(db: &Database) -> Result<()> {
    let worlds = db.list_worlds()?;
    if worlds.is_empty() {
        println!("No worlds yet");
        return Ok(());
    }

    for world in worlds {
        let seen = world.last_accessed.unwrap_or(world.created_at);
        println!("{}  {}  (last used {})", world.id, world.name, format_timestamp(seen));
        if let Some(desc) = world.description.filter(|d| !d.is_empty()) {
            println!("    {}", desc);
        }
    }
    Ok(())
}

fn cmd_create_world(db: &Database, args: &[String]) -> Result<()> {
    let Some(name) = args.first() else {
        anyhow::bail!("Usage: turnwarden create-world <name> [description]");
    };
    if db.world_name_exists(name)? {
        anyhow::bail!("a world named {} already exists", name);
    }

    let mut world = World::new(name.as_str());
    if let Some(desc) = args.get(1) {
        world = world.with_description(desc.as_str());
    }
    db.create_world(&world, None)?;

    println!("Created world {} ({})", world.name, world.id);
    Ok(())
}

fn cmd_stats(db: Arc<Database>, config: &Config, args: &[String]) -> Result<()> {
    let Some(world_id) = args.first() else {
        anyhow::bail!("Usage: turnwarden stats <world-id>");
    };

    let timeline = Timeline::load(db, world_id)?.with_settings(config.timeline());
    let stats = timeline.statistics()?;

    println!("Turn:          {} of {}", timeline.current_turn(), stats.total_turns);
    println!("Events:        {}", stats.total_events);
    for (kind, count) in &stats.events_by_type {
        println!("  {:<18} {}", kind, count);
    }
    if let Some(turn) = stats.most_active_turn {
        println!(
            "Most active:   turn {} ({} events)",
            turn, stats.most_active_turn_events
        );
    }
    Ok(())
}

fn cmd_export(db: Arc<Database>, config: &Config, args: &[String]) -> Result<()> {
    let Some(world_id) = args.first() else {
        anyhow::bail!("Usage: turnwarden export <world-id> [start-turn] [end-turn]");
    };
    let start = parse_turn(args.get(1))?;
    let end = parse_turn(args.get(2))?;

    let timeline = Timeline::load(db, world_id)?.with_settings(config.timeline());
    println!("{}", timeline.export(start, end)?.to_json()?);
    Ok(())
}

fn cmd_board(db: &Database, args: &[String]) -> Result<()> {
    let Some(map_id) = args.first() else {
        anyhow::bail!("Usage: turnwarden board <map-id> [turn]");
    };
    let turn = parse_turn(args.get(1))?;

    let map = db
        .get_map(map_id)?
        .with_context(|| format!("map {} not found", map_id))?;
    let board = db.get_map_tokens_with_history(&map.id, turn)?;

    match turn {
        Some(t) => println!("{} as of turn {}", map.name, t),
        None => println!("{} (live)", map.name),
    }
    for token in board {
        let source = match token.source {
            PositionSource::Live => "live".to_string(),
            PositionSource::Snapshot(t) => format!("turn {}", t),
        };
        let hp = token
            .hp
            .map(|hp| format!("{}/{}", hp, token.max_hp))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} ({:>4}, {:>4})  init {:>3}  hp {:<9} [{}]",
            token.name, token.x, token.y, token.initiative, hp, source
        );
        if !token.status_effects.is_empty() {
            println!("    {}", token.status_effects.join(", "));
        }
    }
    Ok(())
}

fn cmd_roll(config: &Config, args: &[String]) -> Result<()> {
    if args.is_empty() {
        anyhow::bail!("Usage: turnwarden roll <expr>");
    }

    let expr = args.join(" ");
    let mut roller = DiceRoller::new(config.max_dice);
    let roll = roller.roll_str(&expr)?;
    println!("{}", roll);
    Ok(())
}
