// Headless runner for the colony navigation core.
//
// Builds a small demonstration colony, spawns agents, keeps them busy with
// gather and walk orders, runs the sim for a fixed number of ticks and
// prints what the navigation core did. No rendering, no wall-clock pacing:
// ticks run as fast as the machine allows.
//
// Usage:
//   colony_headless [OPTIONS]
//     --config <FILE>   JSON GameConfig (default: built-in defaults)
//     --agents <N>      Number of colonists (default: 8)
//     --ticks <N>       Ticks to simulate (default: 2000)
//     --sync            Disable the async path queue
//     --verbose         Log at debug level unless RUST_LOG says otherwise
//
// The demo colony: a walled compound with one door, a storehouse inside, a
// road across the map, a mud patch, and trees and rocks scattered around.
// Half the colonists start inside the compound.

use std::collections::BTreeMap;
use std::process;

use colony_sim::command::{SimAction, SimCommand};
use colony_sim::config::GameConfig;
use colony_sim::event::SimEventKind;
use colony_sim::sim::SimState;
use colony_sim::types::{AgentId, PathPriority, TerrainType, TileCoord, TileRect, WorldPos};
use colony_sim::world::{BuildingKind, ResourceKind, WorldState};
use log::{info, warn};

struct RunOptions {
    config_path: Option<String>,
    agents: u32,
    ticks: u64,
    sync: bool,
    verbose: bool,
}

fn main() {
    let opts = parse_args();

    let default_level = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut config = match &opts.config_path {
        Some(path) => load_config(path),
        None => GameConfig::default(),
    };
    if opts.sync {
        config.path_queue.async_enabled = false;
    }

    let world = build_colony(&config);
    let mut sim = match SimState::with_world(config, world) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("Failed to set up the colony: {e}");
            process::exit(1);
        }
    };
    info!(
        "colony ready: {}x{} tiles, {} buildings, {} resources, async queue {}",
        sim.world.cols,
        sim.world.rows,
        sim.world.buildings.len(),
        sim.world.resources.len(),
        if sim.config.path_queue.async_enabled { "on" } else { "off" }
    );

    let spawns = spawn_commands(&sim, opts.agents);
    let mut tally = Tally::default();
    tally.record(&sim.step(&spawns).events);

    let mut round = 0u32;
    while sim.tick < opts.ticks {
        let orders = idle_orders(&sim, round);
        round += 1;
        let result = sim.step(&orders);
        tally.record(&result.events);
    }

    println!("Simulated {} ticks ({} ms of sim time)", sim.tick, sim.clock_ms);
    println!(
        "Agents: {}  Resources left: {}",
        sim.agents.len(),
        sim.world.resources.len()
    );
    println!();
    println!("Events:");
    for (name, count) in &tally.counts {
        println!("  {name:<18} {count}");
    }
    println!();
    println!("Navigation:");
    for line in sim.nav_stats().to_string().lines() {
        println!("  {line}");
    }
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching.
fn parse_args() -> RunOptions {
    let mut opts = RunOptions {
        config_path: None,
        agents: 8,
        ticks: 2000,
        sync: false,
        verbose: false,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                opts.config_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--config requires a file path");
                    process::exit(1);
                }));
            }
            "--agents" => {
                i += 1;
                opts.agents = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--agents requires a valid number");
                    process::exit(1);
                });
            }
            "--ticks" => {
                i += 1;
                opts.ticks = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--ticks requires a valid number");
                    process::exit(1);
                });
            }
            "--sync" => opts.sync = true,
            "--verbose" | "-v" => opts.verbose = true,
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    opts
}

fn print_usage() {
    println!("Usage: colony_headless [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <FILE>   JSON GameConfig (default: built-in defaults)");
    println!("  --agents <N>      Number of colonists (default: 8)");
    println!("  --ticks <N>       Ticks to simulate (default: 2000)");
    println!("  --sync            Disable the async path queue");
    println!("  --verbose, -v     Debug-level logging (RUST_LOG overrides)");
    println!("  --help, -h        Show this help");
}

fn load_config(path: &str) -> GameConfig {
    let json = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {path}: {e}");
        process::exit(1);
    });
    GameConfig::from_json(&json).unwrap_or_else(|e| {
        eprintln!("Invalid config {path}: {e}");
        process::exit(1);
    })
}

/// Compound footprint (walls included), scaled to the map.
fn compound(config: &GameConfig) -> TileRect {
    let side = (config.world_cols.min(config.world_rows) / 4).max(8) as i32;
    let x = (config.world_cols as i32 / 8).max(1);
    let y = (config.world_rows as i32 / 8).max(1);
    TileRect::new(x, y, side, side)
}

fn tile_center(tile: TileCoord, tile_size: f32) -> WorldPos {
    WorldPos::new(
        tile.x as f32 * tile_size + tile_size / 2.0,
        tile.y as f32 * tile_size + tile_size / 2.0,
    )
}

/// Lay out the demo colony. Everything is placed deterministically.
fn build_colony(config: &GameConfig) -> WorldState {
    let cols = config.world_cols as i32;
    let rows = config.world_rows as i32;
    let ts = config.tile_size;
    let mut world = WorldState::new(config.world_cols, config.world_rows, ts);
    if cols < 24 || rows < 24 {
        warn!("map is {cols}x{rows}; too small for the demo layout, using open ground");
        return world;
    }

    // Road across the middle and a mud patch to the east.
    world.set_terrain_rect(TileRect::new(0, rows / 2, cols, 2), TerrainType::Road);
    world.set_terrain_rect(
        TileRect::new(cols * 5 / 8, rows / 8, cols / 6, rows / 6),
        TerrainType::Mud,
    );
    world.set_terrain_rect(
        TileRect::new(cols * 3 / 4, rows * 3 / 4, cols / 8, 2),
        TerrainType::Water,
    );

    // Walled compound with a door in the south wall.
    let c = compound(config);
    let (x0, y0, x1, y1) = (c.x, c.y, c.x + c.width - 1, c.y + c.height - 1);
    let door_x = c.x + c.width / 2;
    world.add_building(BuildingKind::Wall, TileRect::new(x0, y0, c.width, 1));
    world.add_building(BuildingKind::Wall, TileRect::new(x0, y0 + 1, 1, c.height - 1));
    world.add_building(BuildingKind::Wall, TileRect::new(x1, y0 + 1, 1, c.height - 1));
    world.add_building(BuildingKind::Wall, TileRect::new(x0 + 1, y1, door_x - x0 - 1, 1));
    world.add_building(BuildingKind::Door, TileRect::new(door_x, y1, 1, 1));
    world.add_building(BuildingKind::Wall, TileRect::new(door_x + 1, y1, x1 - door_x - 1, 1));
    world.add_building(BuildingKind::Storage, TileRect::new(x0 + 2, y0 + 2, 3, 2));
    world.add_building(BuildingKind::Farm, TileRect::new(x1 - 4, y0 + 2, 3, 3));

    // A grove south of the road and rocks along the east edge.
    for i in 0..8 {
        let tx = cols / 8 + i * (cols / 10).max(2);
        let ty = rows * 5 / 8 + (i % 3) * 3;
        world.add_resource(
            ResourceKind::Tree,
            tile_center(TileCoord::new(tx, ty), ts),
            ts * 0.45,
        );
    }
    for i in 0..4 {
        let tx = cols - 6;
        let ty = rows / 4 + i * (rows / 10).max(2);
        world.add_resource(
            ResourceKind::Rock,
            tile_center(TileCoord::new(tx, ty), ts),
            ts * 0.6,
        );
    }
    world
}

/// Half the colonists inside the compound, half outside near the road.
fn spawn_commands(sim: &SimState, agents: u32) -> Vec<SimCommand> {
    let ts = sim.config.tile_size;
    let c = compound(&sim.config);
    let tick = sim.tick + 1;
    (0..agents)
        .map(|i| {
            let i = i as i32;
            let tile = if i % 2 == 0 {
                TileCoord::new(c.x + 2 + (i / 2) % (c.width - 4).max(1), c.y + c.height - 3)
            } else {
                TileCoord::new(
                    (2 + i * 3) % sim.world.cols as i32,
                    sim.world.rows as i32 / 2 - 2,
                )
            };
            SimCommand::new(
                tick,
                SimAction::SpawnAgent {
                    position: tile_center(tile, ts),
                },
            )
        })
        .collect()
}

/// Orders for every idle colonist: odd-numbered ones gather the nearest
/// unreserved resource, the rest (and anyone with nothing to gather) walk
/// to a pseudo-random open tile.
fn idle_orders(sim: &SimState, round: u32) -> Vec<SimCommand> {
    let tick = sim.tick + 1;
    let grid = sim.navigator.grid();
    let mut claimed = Vec::new();
    let mut orders = Vec::new();

    for (&id, agent) in &sim.agents {
        if agent.goal.is_some() {
            continue;
        }
        let pos = agent.mobile.position;
        if id.0 % 2 == 1 {
            let nearest = sim
                .world
                .resources
                .values()
                .filter(|r| sim.reservations.holder_of(r.id).is_none() && !claimed.contains(&r.id))
                .min_by(|a, b| {
                    a.center
                        .distance_sq(pos)
                        .total_cmp(&b.center.distance_sq(pos))
                        .then(a.id.cmp(&b.id))
                });
            if let Some(resource) = nearest {
                claimed.push(resource.id);
                orders.push(SimCommand::new(
                    tick,
                    SimAction::Gather {
                        agent: id,
                        resource: resource.id,
                    },
                ));
                continue;
            }
        }
        if let Some(target) = wander_target(sim, id, round) {
            orders.push(SimCommand::new(
                tick,
                SimAction::SetGoal {
                    agent: id,
                    target: grid.tile_center(target),
                    arrive_radius: None,
                    priority: if id.0 % 3 == 0 {
                        PathPriority::Work
                    } else {
                        PathPriority::Idle
                    },
                },
            ));
        }
    }
    orders
}

/// A deterministic scatter of destinations; skips solid tiles.
fn wander_target(sim: &SimState, id: AgentId, round: u32) -> Option<TileCoord> {
    let grid = sim.navigator.grid();
    let cols = grid.cols as u64;
    let rows = grid.rows as u64;
    let seed = u64::from(id.0) * 7919 + u64::from(round) * 104_729;
    (0..16u64).find_map(|k| {
        let n = seed.wrapping_add(k * 31);
        let tile = TileCoord::new(((n * 17) % cols) as i32, ((n * 29 + 3) % rows) as i32);
        (!grid.is_solid(tile)).then_some(tile)
    })
}

/// Event counts by kind, for the summary.
#[derive(Default)]
struct Tally {
    counts: BTreeMap<&'static str, u64>,
}

impl Tally {
    fn record(&mut self, events: &[colony_sim::event::SimEvent]) {
        for event in events {
            let name = match event.kind {
                SimEventKind::AgentSpawned { .. } => "agent spawned",
                SimEventKind::AgentArrived { .. } => "agent arrived",
                SimEventKind::PathFailed { .. } => "path failed",
                SimEventKind::GatherStarted { .. } => "gather started",
                SimEventKind::GatherFailed { .. } => "gather failed",
                SimEventKind::ResourceDepleted { .. } => "resource depleted",
                SimEventKind::BuildingPlaced { .. } => "building placed",
                SimEventKind::BuildingRemoved { .. } => "building removed",
                SimEventKind::NavGridRebuilt { .. } => "nav grid rebuilt",
            };
            *self.counts.entry(name).or_default() += 1;
        }
    }
}
