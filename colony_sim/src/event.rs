// Narrative events emitted by the simulation.
//
// `SimState::step()` returns the events produced during that tick in the
// order they happened. Nothing inside the sim reads them back; they exist
// for logs, UIs and tests.
//
// See also: `sim.rs` which emits these, `command.rs` for the input side.

use crate::types::{AgentId, BuildingId, ResourceId, TileRect, WorldPos};
use crate::world::BuildingKind;
use serde::{Deserialize, Serialize};

/// A player-visible event, stamped with the tick it happened on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

/// Why a gather order was abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatherFailure {
    /// No such resource (never existed, or already harvested).
    Missing,
    /// Another agent holds the reservation.
    Reserved,
    /// No reachable approach point.
    Unreachable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    AgentSpawned {
        agent: AgentId,
        position: WorldPos,
    },
    /// An agent reached the target of a walk order.
    AgentArrived {
        agent: AgentId,
        position: WorldPos,
    },
    /// The agent's goal can't be reached; the order was dropped.
    PathFailed {
        agent: AgentId,
        target: WorldPos,
    },
    GatherStarted {
        agent: AgentId,
        resource: ResourceId,
        stand_at: WorldPos,
    },
    GatherFailed {
        agent: AgentId,
        resource: ResourceId,
        reason: GatherFailure,
    },
    /// A resource was harvested (by `agent`) or removed by command.
    ResourceDepleted {
        resource: ResourceId,
        agent: Option<AgentId>,
    },
    BuildingPlaced {
        building: BuildingId,
        kind: BuildingKind,
        footprint: TileRect,
    },
    BuildingRemoved {
        building: BuildingId,
    },
    /// The nav grid was rebuilt over `area` (`full` for whole-map rebuilds).
    NavGridRebuilt {
        area: TileRect,
        full: bool,
    },
}
