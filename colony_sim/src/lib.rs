// colony_sim: navigation core for a 2D tile-based colony simulation.
//
// This crate turns a world of terrain, buildings and resource nodes into a
// weighted tile grid, finds 8-directional paths across it, caches them
// against per-region version stamps, queues path requests with supersession
// and timeouts, and moves agents along the results. A small deterministic
// simulation harness (`sim.rs`) drives it all and can run headless.
//
// Module overview:
// - `navigator.rs`:   Navigator facade: rebuilds, path queries, per-tick movement, stats.
// - `grid.rs`:        TerrainCostGrid: per-tile solidity and cost multipliers.
// - `nav_builder.rs`: NavGridBuilder: stamps terrain, resources and buildings into the grid.
// - `pathfinding.rs`: 8-directional weighted A* with reusable scratch buffers.
// - `region.rs`:      RegionVersionManager: per-chunk version counters and snapshots.
// - `path_cache.rs`:  PathCache: version-validated memoization keyed by tile pairs.
// - `path_queue.rs`:  AsyncPathRequestQueue: one live request per agent, priorities, fallbacks.
// - `approach.rs`:    ApproachPointResolver: where to stand to interact with a circle.
// - `movement.rs`:    MovementController: path following, jitter escape, door waits.
// - `door.rs`:        DoorGate trait + FIFO DoorQueues.
// - `reservation.rs`: ReservationTable: one harvester per resource.
// - `world.rs`:       WorldState: terrain, buildings and resources (the structural truth).
// - `sim.rs`:         SimState, tick loop, command handling, save/load.
// - `command.rs`:     SimCommand / SimAction: all sim mutations.
// - `event.rs`:       Narrative SimEvents.
// - `config.rs`:      GameConfig: every tunable parameter.
// - `error.rs`:       NavError: hard faults only.
// - `types.rs`:       WorldPos, TileCoord, TileRect, entity IDs, terrain and priority enums.
//
// The companion crate `colony_headless` runs a demo colony from the
// command line and prints navigation statistics.
//
// **Critical constraint: determinism.** The simulation is a pure function:
// `(state, commands) -> (new_state, events)`. No system time, no OS
// entropy. Ordered collections (`BTreeMap`) wherever iteration order can
// reach the output; the one hash map (the path cache) is only ever probed
// by key or scanned for removal.

pub mod approach;
pub mod command;
pub mod config;
pub mod door;
pub mod error;
pub mod event;
pub mod grid;
pub mod movement;
pub mod nav_builder;
pub mod navigator;
pub mod path_cache;
pub mod path_queue;
pub mod pathfinding;
pub mod region;
pub mod reservation;
pub mod sim;
pub mod types;
pub mod world;
