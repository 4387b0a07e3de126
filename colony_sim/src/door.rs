// Door arbitration: one agent through a doorway at a time.
//
// `DoorGate` is the seam the movement controller talks to. It must tolerate
// being polled by many agents in one tick: `is_open_for` has no side
// effects, and `enqueue` is idempotent, so an agent can re-check every tick
// until it's granted passage.
//
// `DoorQueues` implements it with a FIFO queue per door. The head of the
// queue holds the door; an empty queue is open to anyone. An agent passing
// through enqueues itself (becoming head if the door was free) and releases
// once it leaves the door tile.
//
// See also: `movement.rs` (the only caller during a tick), `sim.rs` which
// re-syncs door registrations after building changes.
//
// **Critical constraint: determinism.** Queues are `VecDeque`s in a
// `BTreeMap` keyed by door id; grant order is arrival order.

use crate::types::{AgentId, BuildingId, TileCoord};
use crate::world::WorldState;
use log::debug;
use std::collections::{BTreeMap, VecDeque};

pub trait DoorGate {
    /// The door occupying `tile`, if any.
    fn door_at(&self, tile: TileCoord) -> Option<BuildingId>;
    /// Whether `agent` may step onto the door now. Pure query.
    fn is_open_for(&self, door: BuildingId, agent: AgentId) -> bool;
    /// Join the door's queue. Joining twice is a no-op.
    fn enqueue(&mut self, door: BuildingId, agent: AgentId);
    /// Leave the door's queue, passing the door to the next in line.
    fn release(&mut self, door: BuildingId, agent: AgentId);
}

#[derive(Clone, Debug, Default)]
pub struct DoorQueues {
    tiles: BTreeMap<TileCoord, BuildingId>,
    queues: BTreeMap<BuildingId, VecDeque<AgentId>>,
}

impl DoorQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the tile map from the world's door buildings. Queues of
    /// doors that no longer exist are dropped; surviving queues keep their
    /// order.
    pub fn sync_with_world(&mut self, world: &WorldState) {
        self.tiles.clear();
        for door in world.doors() {
            for tile in door.footprint.tiles() {
                self.tiles.insert(tile, door.id);
            }
            self.queues.entry(door.id).or_default();
        }
        let before = self.queues.len();
        self.queues.retain(|id, _| world.buildings.contains_key(id));
        if self.queues.len() != before {
            debug!("dropped {} demolished door queue(s)", before - self.queues.len());
        }
    }

    pub fn holder(&self, door: BuildingId) -> Option<AgentId> {
        self.queues.get(&door).and_then(|q| q.front().copied())
    }

    pub fn queue_len(&self, door: BuildingId) -> usize {
        self.queues.get(&door).map_or(0, VecDeque::len)
    }
}

impl DoorGate for DoorQueues {
    fn door_at(&self, tile: TileCoord) -> Option<BuildingId> {
        self.tiles.get(&tile).copied()
    }

    fn is_open_for(&self, door: BuildingId, agent: AgentId) -> bool {
        match self.queues.get(&door).and_then(|q| q.front()) {
            None => true,
            Some(&head) => head == agent,
        }
    }

    fn enqueue(&mut self, door: BuildingId, agent: AgentId) {
        let queue = self.queues.entry(door).or_default();
        if !queue.contains(&agent) {
            queue.push_back(agent);
        }
    }

    fn release(&mut self, door: BuildingId, agent: AgentId) {
        if let Some(queue) = self.queues.get_mut(&door) {
            queue.retain(|&a| a != agent);
        }
    }
}

/// A gate with no doors; every tile is open.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDoors;

impl DoorGate for NoDoors {
    fn door_at(&self, _tile: TileCoord) -> Option<BuildingId> {
        None
    }

    fn is_open_for(&self, _door: BuildingId, _agent: AgentId) -> bool {
        true
    }

    fn enqueue(&mut self, _door: BuildingId, _agent: AgentId) {}

    fn release(&mut self, _door: BuildingId, _agent: AgentId) {}
}
