// Simulation harness and tick loop.
//
// `SimState` is the single source of truth for a colony: config, world,
// agents, door queues, reservations and the navigation core. It advances
// in fixed ticks of `tick_duration_ms`:
//
//   1. apply this tick's commands (world edits rebuild the nav grid, either
//      partially around the edit or in full when the edit covers more than
//      a quarter of the map)
//   2. move every agent with a goal, in ascending `AgentId` order
//   3. pump the async path queue and hand results to their agents
//   4. every `clean_interval_ticks`, age out old cached paths
//
// Gathering: a `Gather` command reserves the resource, resolves an
// approach point around it and walks there. On arrival the resource is
// removed, the grid rebuilt around it and the reservation released.
//
// Save/load: `to_json()` / `from_json()`. The navigator and door queues
// are transient (`#[serde(skip)]`), as is each agent's path-following
// state; `rebuild_transient_state()` rebuilds them from the restored world.
// Agents with goals simply replan on the next tick.
//
// See also: `navigator.rs` for everything path-related, `command.rs` /
// `event.rs` for the input and output types, `world.rs` for the world
// registry.
//
// **Critical constraint: determinism.** All state changes flow through
// `SimCommand`s. The clock is `tick * tick_duration_ms`; nothing reads
// wall time.

use crate::approach::Circle;
use crate::command::{SimAction, SimCommand};
use crate::config::GameConfig;
use crate::door::DoorQueues;
use crate::error::NavError;
use crate::event::{GatherFailure, SimEvent, SimEventKind};
use crate::movement::MobileAgent;
use crate::navigator::{MoveOrder, MoveStatus, NavStats, Navigator};
use crate::reservation::ReservationTable;
use crate::types::{AgentId, PathPriority, ResourceId, TileRect, WorldPos};
use crate::world::WorldState;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What an agent is currently trying to do.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AgentGoal {
    Walk {
        target: WorldPos,
        arrive_radius: f32,
        priority: PathPriority,
    },
    /// Walk to `stand_at`, then harvest `resource`.
    Gather {
        resource: ResourceId,
        stand_at: WorldPos,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub mobile: MobileAgent,
    pub goal: Option<AgentGoal>,
}

/// Top-level simulation state.
#[derive(Serialize, Deserialize)]
pub struct SimState {
    /// Current simulation tick.
    pub tick: u64,

    /// Simulation milliseconds elapsed; the navigator's clock.
    pub clock_ms: u64,

    /// Game configuration (immutable after initialization).
    pub config: GameConfig,

    pub world: WorldState,

    /// All agents, keyed by ID. BTreeMap for deterministic iteration.
    pub agents: BTreeMap<AgentId, Agent>,

    pub reservations: ReservationTable,

    next_agent_id: u32,

    /// Door queues. Rebuilt from the world, not serialized.
    #[serde(skip)]
    pub doors: DoorQueues,

    /// Navigation core. Rebuilt from the world, not serialized.
    #[serde(skip)]
    pub navigator: Navigator,
}

/// The result of advancing the simulation one tick.
pub struct StepResult {
    /// Narrative events emitted during this step, in order.
    pub events: Vec<SimEvent>,
}

impl SimState {
    /// Empty grass world sized by `config`.
    pub fn new(config: GameConfig) -> Result<Self, NavError> {
        config.validate()?;
        let world = WorldState::new(config.world_cols, config.world_rows, config.tile_size);
        Self::with_world(config, world)
    }

    /// Start a simulation over an existing world.
    pub fn with_world(config: GameConfig, world: WorldState) -> Result<Self, NavError> {
        let mut state = Self {
            tick: 0,
            clock_ms: 0,
            config,
            world,
            agents: BTreeMap::new(),
            reservations: ReservationTable::new(),
            next_agent_id: 0,
            doors: DoorQueues::new(),
            navigator: Navigator::default(),
        };
        state.rebuild_transient_state()?;
        Ok(state)
    }

    /// Advance one tick, applying `commands` whose tick has come. Commands
    /// aimed at a later tick are left for a later call.
    pub fn step(&mut self, commands: &[SimCommand]) -> StepResult {
        let mut events = Vec::new();
        self.tick += 1;
        self.clock_ms += u64::from(self.config.tick_duration_ms);
        self.navigator.set_clock(self.clock_ms);

        for cmd in commands {
            if cmd.tick > self.tick {
                debug!("deferring command for tick {} (now {})", cmd.tick, self.tick);
                continue;
            }
            self.apply_command(&cmd.action, &mut events);
        }

        self.move_agents(&mut events);

        for resolution in self.navigator.pump() {
            if let Some(agent) = self.agents.get_mut(&resolution.agent) {
                self.navigator
                    .apply_resolution(&mut agent.mobile, &mut self.doors, resolution);
            }
        }

        let interval = self.config.path_cache.clean_interval_ticks;
        if interval > 0 && self.tick % interval == 0 {
            self.navigator.clean_cache();
        }

        StepResult { events }
    }

    fn emit(&self, events: &mut Vec<SimEvent>, kind: SimEventKind) {
        events.push(SimEvent {
            tick: self.tick,
            kind,
        });
    }

    fn apply_command(&mut self, action: &SimAction, events: &mut Vec<SimEvent>) {
        match *action {
            SimAction::SpawnAgent { position } => {
                let id = AgentId(self.next_agent_id);
                self.next_agent_id += 1;
                let position = self.navigator.grid().clamp(position);
                let mobile = MobileAgent::new(id, position, self.config.default_motion);
                self.agents.insert(id, Agent { mobile, goal: None });
                self.emit(events, SimEventKind::AgentSpawned { agent: id, position });
            }
            SimAction::SetGoal {
                agent,
                target,
                arrive_radius,
                priority,
            } => {
                if !self.agents.contains_key(&agent) {
                    warn!("SetGoal for unknown {}", agent);
                    return;
                }
                self.drop_goal(agent);
                let arrive_radius =
                    arrive_radius.unwrap_or(self.config.movement.default_arrive_radius);
                if let Some(a) = self.agents.get_mut(&agent) {
                    a.goal = Some(AgentGoal::Walk {
                        target,
                        arrive_radius,
                        priority,
                    });
                }
            }
            SimAction::ClearGoal { agent } => self.drop_goal(agent),
            SimAction::PlaceBuilding { kind, footprint } => {
                let footprint = footprint.intersect(&self.world.bounds());
                if footprint.is_empty() {
                    warn!("ignoring {:?} placed off the map", kind);
                    return;
                }
                let building = self.world.add_building(kind, footprint);
                self.doors.sync_with_world(&self.world);
                self.emit(
                    events,
                    SimEventKind::BuildingPlaced {
                        building,
                        kind,
                        footprint,
                    },
                );
                self.rebuild_area(footprint, events);
            }
            SimAction::RemoveBuilding { building } => {
                let Some(removed) = self.world.remove_building(building) else {
                    warn!("RemoveBuilding for unknown {}", building);
                    return;
                };
                self.doors.sync_with_world(&self.world);
                self.emit(events, SimEventKind::BuildingRemoved { building });
                self.rebuild_area(removed.footprint, events);
            }
            SimAction::SetTerrain { area, terrain } => {
                let area = self.world.set_terrain_rect(area, terrain);
                self.rebuild_area(area, events);
            }
            SimAction::AddResource {
                kind,
                center,
                radius,
            } => {
                let id = self.world.add_resource(kind, center, radius);
                if let Some(node) = self.world.resources.get(&id) {
                    let area = node.tile_bounds(self.world.tile_size);
                    self.rebuild_area(area, events);
                }
            }
            SimAction::RemoveResource { resource } => {
                self.deplete(resource, None, events);
            }
            SimAction::Gather { agent, resource } => self.start_gather(agent, resource, events),
        }
    }

    /// Rebuild the nav grid over `area` (clipped to the map).
    fn rebuild_area(&mut self, area: TileRect, events: &mut Vec<SimEvent>) {
        let area = area.intersect(&self.world.bounds());
        if area.is_empty() {
            return;
        }
        let full = area.area() * 4 > self.world.bounds().area();
        let result = if full {
            self.navigator.rebuild_nav_grid(&self.world)
        } else {
            let ts = self.world.tile_size;
            let (cx, cy) = area.center_tiles();
            let center = WorldPos::new(cx * ts, cy * ts);
            let radius = (area.width as f32).hypot(area.height as f32) / 2.0 * ts;
            self.navigator
                .rebuild_nav_grid_partial(&self.world, center, radius)
        };
        match result {
            Ok(()) => self.emit(events, SimEventKind::NavGridRebuilt { area, full }),
            Err(e) => error!("nav grid rebuild over {:?} failed: {}", area, e),
        }
    }

    /// Drop the agent's goal and everything attached to it.
    fn drop_goal(&mut self, id: AgentId) {
        if let Some(agent) = self.agents.get_mut(&id) {
            self.navigator.clear_path(&mut agent.mobile, &mut self.doors);
            agent.goal = None;
        }
        self.reservations.release_all_for(id);
    }

    fn start_gather(&mut self, agent: AgentId, resource: ResourceId, events: &mut Vec<SimEvent>) {
        let Some(from) = self.agents.get(&agent).map(|a| a.mobile.position) else {
            warn!("Gather for unknown {}", agent);
            return;
        };
        let fail = move |reason| SimEventKind::GatherFailed {
            agent,
            resource,
            reason,
        };
        let Some(node) = self.world.resources.get(&resource) else {
            self.emit(events, fail(GatherFailure::Missing));
            return;
        };
        let circle = Circle {
            center: node.center,
            radius: node.radius,
        };
        if self
            .reservations
            .holder_of(resource)
            .is_some_and(|holder| holder != agent)
        {
            self.emit(events, fail(GatherFailure::Reserved));
            return;
        }

        self.drop_goal(agent);
        self.reservations.acquire(resource, agent);
        let Some(point) =
            self.navigator
                .best_approach_to_circle(from, &circle, self.config.gather_reach)
        else {
            self.reservations.release(resource, agent);
            self.emit(events, fail(GatherFailure::Unreachable));
            return;
        };
        if let Some(a) = self.agents.get_mut(&agent) {
            a.goal = Some(AgentGoal::Gather {
                resource,
                stand_at: point.pos,
            });
        }
        self.emit(
            events,
            SimEventKind::GatherStarted {
                agent,
                resource,
                stand_at: point.pos,
            },
        );
    }

    /// Remove a resource from the world (harvested by `by`, or by command).
    fn deplete(&mut self, resource: ResourceId, by: Option<AgentId>, events: &mut Vec<SimEvent>) {
        let Some(node) = self.world.remove_resource(resource) else {
            warn!("RemoveResource for unknown {}", resource);
            return;
        };
        self.reservations.forget(resource);
        self.emit(
            events,
            SimEventKind::ResourceDepleted {
                resource,
                agent: by,
            },
        );
        self.rebuild_area(node.tile_bounds(self.world.tile_size), events);
    }

    fn move_agents(&mut self, events: &mut Vec<SimEvent>) {
        let dt = self.config.tick_duration_ms as f32 / 1000.0;
        let ids: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|(_, a)| a.goal.is_some())
            .map(|(&id, _)| id)
            .collect();

        for id in ids {
            let Some(agent) = self.agents.get_mut(&id) else {
                continue;
            };
            let Some(goal) = agent.goal else {
                continue;
            };
            let order = match goal {
                AgentGoal::Walk {
                    target,
                    arrive_radius,
                    priority,
                } => MoveOrder {
                    target,
                    arrive_radius,
                    priority,
                },
                AgentGoal::Gather { resource, stand_at } => {
                    if !self.world.resources.contains_key(&resource) {
                        self.drop_goal(id);
                        self.emit(
                            events,
                            SimEventKind::GatherFailed {
                                agent: id,
                                resource,
                                reason: GatherFailure::Missing,
                            },
                        );
                        continue;
                    }
                    MoveOrder {
                        target: stand_at,
                        arrive_radius: self.config.movement.default_arrive_radius,
                        priority: PathPriority::ResourceGathering,
                    }
                }
            };

            let status =
                self.navigator
                    .move_along_path(&mut agent.mobile, &mut self.doors, order, dt);
            let position = agent.mobile.position;
            match (status, goal) {
                (MoveStatus::Arrived, AgentGoal::Walk { .. }) => {
                    self.drop_goal(id);
                    self.emit(events, SimEventKind::AgentArrived { agent: id, position });
                }
                (MoveStatus::Arrived, AgentGoal::Gather { resource, .. }) => {
                    self.drop_goal(id);
                    self.deplete(resource, Some(id), events);
                }
                (MoveStatus::Failed, AgentGoal::Walk { target, .. }) => {
                    self.drop_goal(id);
                    self.emit(events, SimEventKind::PathFailed { agent: id, target });
                }
                (MoveStatus::Failed, AgentGoal::Gather { resource, stand_at }) => {
                    self.drop_goal(id);
                    self.emit(
                        events,
                        SimEventKind::PathFailed {
                            agent: id,
                            target: stand_at,
                        },
                    );
                    self.emit(
                        events,
                        SimEventKind::GatherFailed {
                            agent: id,
                            resource,
                            reason: GatherFailure::Unreachable,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    /// Rebuild transient state (door queues, navigator) from the world.
    /// Must be called after deserialization.
    pub fn rebuild_transient_state(&mut self) -> Result<(), NavError> {
        self.doors = DoorQueues::new();
        self.doors.sync_with_world(&self.world);
        self.navigator = Navigator::new(&self.config, &self.world)?;
        self.navigator.set_clock(self.clock_ms);
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a simulation and rebuild its transient state.
    pub fn from_json(json: &str) -> Result<Self, NavError> {
        let mut state: SimState = serde_json::from_str(json)?;
        state.config.validate()?;
        state.rebuild_transient_state()?;
        Ok(state)
    }

    pub fn nav_stats(&self) -> NavStats {
        self.navigator.stats()
    }

    /// Number of agents with an active goal.
    pub fn busy_agents(&self) -> usize {
        self.agents.values().filter(|a| a.goal.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::door::DoorGate;
    use crate::types::{BuildingId, TerrainType, TileCoord};
    use crate::world::{BuildingKind, ResourceKind};

    const TS: f32 = 32.0;

    fn center(x: i32, y: i32) -> WorldPos {
        WorldPos::new(x as f32 * TS + TS / 2.0, y as f32 * TS + TS / 2.0)
    }

    fn small_sim() -> SimState {
        let mut config = GameConfig::default();
        config.world_cols = 32;
        config.world_rows = 32;
        SimState::new(config).unwrap()
    }

    fn now(sim: &SimState, action: SimAction) -> SimCommand {
        SimCommand::new(sim.tick + 1, action)
    }

    fn spawn(sim: &mut SimState, pos: WorldPos) -> AgentId {
        let cmd = now(sim, SimAction::SpawnAgent { position: pos });
        let result = sim.step(&[cmd]);
        match result.events[0].kind {
            SimEventKind::AgentSpawned { agent, .. } => agent,
            ref other => panic!("unexpected event {other:?}"),
        }
    }

    fn walk(agent: AgentId, target: WorldPos) -> SimAction {
        SimAction::SetGoal {
            agent,
            target,
            arrive_radius: None,
            priority: PathPriority::Work,
        }
    }

    /// Step until `pred` matches an event or `limit` ticks pass.
    fn run_until(
        sim: &mut SimState,
        limit: u32,
        pred: impl Fn(&SimEventKind) -> bool,
    ) -> Option<SimEvent> {
        for _ in 0..limit {
            let result = sim.step(&[]);
            if let Some(e) = result.events.into_iter().find(|e| pred(&e.kind)) {
                return Some(e);
            }
        }
        None
    }

    #[test]
    fn spawned_agent_walks_to_goal() {
        let mut sim = small_sim();
        let agent = spawn(&mut sim, center(2, 2));
        let cmd = now(&sim, walk(agent, center(20, 14)));
        sim.step(&[cmd]);
        let arrived = run_until(&mut sim, 2000, |k| {
            matches!(k, SimEventKind::AgentArrived { .. })
        })
        .unwrap();
        match arrived.kind {
            SimEventKind::AgentArrived { position, .. } => {
                assert!(position.distance(center(20, 14)) <= 6.0);
            }
            _ => unreachable!(),
        }
        assert_eq!(sim.busy_agents(), 0);
        assert_eq!(sim.navigator.queue().pending_count(), 0);
    }

    #[test]
    fn agent_spawned_on_the_far_edge_can_still_walk() {
        let mut sim = small_sim();
        let edge = WorldPos::new(32.0 * TS, 32.0 * TS);
        let agent = spawn(&mut sim, edge);
        let position = sim.agents[&agent].mobile.position;
        assert_eq!(sim.navigator.grid().tile_of(position), TileCoord::new(31, 31));

        let cmd = now(&sim, walk(agent, center(26, 28)));
        sim.step(&[cmd]);
        let arrived = run_until(&mut sim, 2000, |k| {
            matches!(
                k,
                SimEventKind::AgentArrived { .. } | SimEventKind::PathFailed { .. }
            )
        })
        .unwrap();
        assert!(matches!(arrived.kind, SimEventKind::AgentArrived { .. }));
    }

    #[test]
    fn future_commands_wait_for_their_tick() {
        let mut sim = small_sim();
        let cmd = SimCommand::new(5, SimAction::SpawnAgent { position: center(1, 1) });
        for _ in 0..4 {
            assert!(sim.step(std::slice::from_ref(&cmd)).events.is_empty());
        }
        assert_eq!(sim.step(&[cmd]).events.len(), 1);
    }

    #[test]
    fn unreachable_goal_emits_path_failed() {
        let mut sim = small_sim();
        let agent = spawn(&mut sim, center(2, 2));
        let cmd = now(
            &sim,
            SimAction::PlaceBuilding {
                kind: BuildingKind::Wall,
                footprint: TileRect::new(16, 0, 1, 32),
            },
        );
        sim.step(&[cmd]);
        let cmd = now(&sim, walk(agent, center(25, 2)));
        sim.step(&[cmd]);
        let failed = run_until(&mut sim, 200, |k| {
            matches!(k, SimEventKind::PathFailed { .. })
        });
        assert!(failed.is_some());
        assert!(sim.agents[&agent].goal.is_none());
    }

    #[test]
    fn placing_a_building_rebuilds_partially() {
        let mut sim = small_sim();
        let cmd = now(
            &sim,
            SimAction::PlaceBuilding {
                kind: BuildingKind::House,
                footprint: TileRect::new(4, 4, 3, 2),
            },
        );
        let events = sim.step(&[cmd]).events;
        assert!(events.iter().any(|e| matches!(
            e.kind,
            SimEventKind::NavGridRebuilt { full: false, .. }
        )));
        let grid = sim.navigator.grid();
        for tile in TileRect::new(4, 4, 3, 2).tiles() {
            assert!(grid.is_solid(tile));
        }
        assert!(!grid.is_solid(TileCoord::new(7, 4)));
        assert!(!grid.is_solid(TileCoord::new(4, 6)));
    }

    #[test]
    fn large_terrain_edit_rebuilds_in_full() {
        let mut sim = small_sim();
        let cmd = now(
            &sim,
            SimAction::SetTerrain {
                area: TileRect::new(0, 0, 32, 16),
                terrain: TerrainType::Road,
            },
        );
        let events = sim.step(&[cmd]).events;
        assert!(events.iter().any(|e| matches!(
            e.kind,
            SimEventKind::NavGridRebuilt { full: true, .. }
        )));
        assert_eq!(sim.navigator.grid().cost_at(TileCoord::new(31, 15)), 0.5);
        assert_eq!(sim.navigator.grid().cost_at(TileCoord::new(31, 16)), 1.0);
    }

    #[test]
    fn gather_harvests_the_tree_and_frees_its_tiles() {
        let mut sim = small_sim();
        let agent = spawn(&mut sim, center(2, 10));
        let cmd = now(
            &sim,
            SimAction::AddResource {
                kind: ResourceKind::Tree,
                center: center(12, 10),
                radius: 14.0,
            },
        );
        sim.step(&[cmd]);
        let tree = *sim.world.resources.keys().next().unwrap();
        assert!(sim.navigator.grid().is_solid(TileCoord::new(12, 10)));

        let cmd = now(&sim, SimAction::Gather { agent, resource: tree });
        let events = sim.step(&[cmd]).events;
        assert!(events.iter().any(|e| matches!(
            e.kind,
            SimEventKind::GatherStarted { .. }
        )));
        assert_eq!(sim.reservations.holder_of(tree), Some(agent));

        let depleted = run_until(&mut sim, 2000, |k| {
            matches!(k, SimEventKind::ResourceDepleted { .. })
        })
        .unwrap();
        assert_eq!(
            depleted.kind,
            SimEventKind::ResourceDepleted {
                resource: tree,
                agent: Some(agent),
            }
        );
        assert!(sim.world.resources.is_empty());
        assert!(sim.reservations.is_empty());
        assert!(!sim.navigator.grid().is_solid(TileCoord::new(12, 10)));
        let pos = sim.agents[&agent].mobile.position;
        assert!(pos.distance(center(12, 10)) <= 14.0 + sim.config.gather_reach + TS);
    }

    #[test]
    fn second_gatherer_is_turned_away() {
        let mut sim = small_sim();
        let a = spawn(&mut sim, center(2, 10));
        let b = spawn(&mut sim, center(2, 12));
        let cmd = now(
            &sim,
            SimAction::AddResource {
                kind: ResourceKind::Rock,
                center: center(12, 10),
                radius: 10.0,
            },
        );
        sim.step(&[cmd]);
        let rock = *sim.world.resources.keys().next().unwrap();
        let tick = sim.tick + 1;
        let events = sim
            .step(&[
                SimCommand::new(tick, SimAction::Gather { agent: a, resource: rock }),
                SimCommand::new(tick, SimAction::Gather { agent: b, resource: rock }),
            ])
            .events;
        assert!(events.iter().any(|e| e.kind
            == SimEventKind::GatherFailed {
                agent: b,
                resource: rock,
                reason: GatherFailure::Reserved,
            }));
        assert_eq!(sim.reservations.holder_of(rock), Some(a));
    }

    #[test]
    fn removing_a_resource_cancels_its_gatherer() {
        let mut sim = small_sim();
        let agent = spawn(&mut sim, center(2, 10));
        let cmd = now(
            &sim,
            SimAction::AddResource {
                kind: ResourceKind::Tree,
                center: center(25, 10),
                radius: 14.0,
            },
        );
        sim.step(&[cmd]);
        let tree = *sim.world.resources.keys().next().unwrap();
        let cmd = now(&sim, SimAction::Gather { agent, resource: tree });
        sim.step(&[cmd]);
        let cmd = now(&sim, SimAction::RemoveResource { resource: tree });
        let events = sim.step(&[cmd]).events;
        assert_eq!(
            events[0].kind,
            SimEventKind::ResourceDepleted {
                resource: tree,
                agent: None,
            }
        );
        let failed = events
            .into_iter()
            .find(|e| matches!(e.kind, SimEventKind::GatherFailed { .. }))
            .unwrap();
        assert_eq!(
            failed.kind,
            SimEventKind::GatherFailed {
                agent,
                resource: tree,
                reason: GatherFailure::Missing,
            }
        );
        assert!(sim.reservations.is_empty());
    }

    #[test]
    fn save_and_load_mid_walk() {
        let mut sim = small_sim();
        let agent = spawn(&mut sim, center(1, 1));
        let cmd = now(
            &sim,
            SimAction::PlaceBuilding {
                kind: BuildingKind::Door,
                footprint: TileRect::new(10, 10, 1, 1),
            },
        );
        sim.step(&[cmd]);
        let cmd = now(&sim, walk(agent, center(28, 28)));
        sim.step(&[cmd]);
        for _ in 0..20 {
            sim.step(&[]);
        }

        let json = sim.to_json().unwrap();
        let mut restored = SimState::from_json(&json).unwrap();
        assert_eq!(restored.tick, sim.tick);
        assert_eq!(restored.agents[&agent].mobile.position, sim.agents[&agent].mobile.position);
        assert!(!restored.agents[&agent].mobile.follow.has_path());
        assert_eq!(
            restored.doors.door_at(TileCoord::new(10, 10)),
            Some(BuildingId(0))
        );
        assert_eq!(restored.navigator.grid().solid_count(), sim.navigator.grid().solid_count());

        let arrived = run_until(&mut restored, 2000, |k| {
            matches!(k, SimEventKind::AgentArrived { .. })
        });
        assert!(arrived.is_some());
    }

    #[test]
    fn identical_inputs_give_identical_states() {
        let script = |sim: &mut SimState| {
            for i in 0..4 {
                let cmd = now(sim, SimAction::SpawnAgent { position: center(1 + i, 1) });
                sim.step(&[cmd]);
            }
            let cmd = now(
                sim,
                SimAction::PlaceBuilding {
                    kind: BuildingKind::Wall,
                    footprint: TileRect::new(8, 0, 1, 20),
                },
            );
            sim.step(&[cmd]);
            let tick = sim.tick + 1;
            let orders: Vec<SimCommand> = (0..4)
                .map(|i| SimCommand::new(tick, walk(AgentId(i), center(20, 5 + i as i32 * 3))))
                .collect();
            sim.step(&orders);
            for _ in 0..300 {
                sim.step(&[]);
            }
        };
        let mut a = small_sim();
        let mut b = small_sim();
        script(&mut a);
        script(&mut b);
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(a.nav_stats(), b.nav_stats());
    }
}
