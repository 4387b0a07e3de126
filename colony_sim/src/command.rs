// Commands that mutate simulation state.
//
// All external mutations go through `SimCommand`. The sim is a function
// `(state, commands) -> (new_state, events)`; commands are the only input.
//
// A `SimCommand` carries the `tick` it is meant for and a `SimAction`:
// - `SpawnAgent` places a new colonist (position clamped to the map).
// - `SetGoal` / `ClearGoal` give or withdraw a walk order.
// - `PlaceBuilding` / `RemoveBuilding` / `SetTerrain` / `AddResource` /
//   `RemoveResource` edit the world and trigger a nav-grid rebuild.
// - `Gather` reserves a resource and sends the agent to harvest it.
//
// See also: `sim.rs` for `apply_command()` which dispatches these,
// `event.rs` for what comes back out.
//
// **Critical constraint: determinism.** Commands are the sole external
// input to the sim.

use crate::types::{
    AgentId, BuildingId, PathPriority, ResourceId, TerrainType, TileRect, WorldPos,
};
use crate::world::{BuildingKind, ResourceKind};
use serde::{Deserialize, Serialize};

/// A command targeting a specific simulation tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimCommand {
    pub tick: u64,
    pub action: SimAction,
}

impl SimCommand {
    pub fn new(tick: u64, action: SimAction) -> Self {
        Self { tick, action }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimAction {
    SpawnAgent {
        position: WorldPos,
    },
    /// Walk to `target`. `arrive_radius` defaults to the configured one.
    SetGoal {
        agent: AgentId,
        target: WorldPos,
        arrive_radius: Option<f32>,
        priority: PathPriority,
    },
    ClearGoal {
        agent: AgentId,
    },
    PlaceBuilding {
        kind: BuildingKind,
        footprint: TileRect,
    },
    RemoveBuilding {
        building: BuildingId,
    },
    SetTerrain {
        area: TileRect,
        terrain: TerrainType,
    },
    AddResource {
        kind: ResourceKind,
        center: WorldPos,
        radius: f32,
    },
    RemoveResource {
        resource: ResourceId,
    },
    Gather {
        agent: AgentId,
        resource: ResourceId,
    },
}
