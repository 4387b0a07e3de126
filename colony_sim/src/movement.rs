// Per-agent path following.
//
// `MovementController::follow` advances one agent along its assigned path
// for one tick. The agent visits every node in order; a node is reached
// when this tick's remaining travel covers the distance to it, at which
// point the agent snaps exactly onto it and any leftover travel carries on
// toward the next node. Speed is the motion profile's effective speed
// divided by the cost of the tile the agent stands on.
//
// Jitter: each tick the distance to the current node is compared with the
// previous tick's. A reversal of the trend while near the node raises the
// jitter score; a steady trend lowers it. When the score reaches the
// threshold, or the agent has spent too long on one node, the controller
// force-resolves: close enough means skip the node, otherwise the caller
// must replan (`FollowOutcome::JitterReplan`). "Too long" is fixed when the
// approach starts: the configured floor or a multiple of the expected
// travel time, whichever is longer, so slow agents are not cut short.
//
// Doors: before stepping onto a door tile the agent joins the door's queue
// and only proceeds when `DoorGate::is_open_for` grants it. It releases the
// door once it has stepped off the door tile again. Polling while waiting
// is side-effect free.
//
// The controller never plans. Replanning, arrival against the caller's
// target and async requests live in `navigator.rs`.
//
// See also: `door.rs` for the gate, `config.rs` (`MovementParams`).

use crate::config::MovementParams;
use crate::door::DoorGate;
use crate::grid::TerrainCostGrid;
use crate::types::{AgentId, BuildingId, Facing, TileCoord, WorldPos};
use serde::{Deserialize, Serialize};

/// Slack added to this tick's travel when deciding a node is reached.
const ARRIVE_EPSILON: f32 = 1e-3;

/// Speed modifiers of one agent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionProfile {
    /// World units per second on a cost-1.0 tile.
    pub base_speed: f32,
    pub fatigue_multiplier: f32,
    pub equipment_speed_multiplier: f32,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            base_speed: 60.0,
            fatigue_multiplier: 1.0,
            equipment_speed_multiplier: 1.0,
        }
    }
}

impl MotionProfile {
    pub fn effective_speed(&self) -> f32 {
        (self.base_speed * self.fatigue_multiplier * self.equipment_speed_multiplier).max(0.0)
    }
}

/// Oscillation detector for the node currently being approached.
#[derive(Clone, Debug, Default)]
pub struct JitterTracker {
    pub score: u32,
    /// Observations since the last reset.
    pub window: u32,
    last_dist: Option<f32>,
    last_sign: i8,
}

impl JitterTracker {
    /// Record this tick's distance to the node. Returns the updated score.
    pub fn observe(&mut self, dist: f32, near: bool) -> u32 {
        if let Some(prev) = self.last_dist {
            let delta = dist - prev;
            let sign = if delta > ARRIVE_EPSILON {
                1
            } else if delta < -ARRIVE_EPSILON {
                -1
            } else {
                0
            };
            if sign != 0 {
                if self.last_sign != 0 && sign != self.last_sign && near {
                    self.score += 1;
                } else if sign == self.last_sign {
                    self.score = self.score.saturating_sub(1);
                }
                self.last_sign = sign;
            }
        }
        self.last_dist = Some(dist);
        self.window += 1;
        self.score
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A door the agent has been granted and not yet released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DoorPass {
    pub door: BuildingId,
    pub tile: TileCoord,
    /// Set once the agent has stood on the door tile.
    pub entered: bool,
}

/// Path-following state embedded in every mobile agent.
#[derive(Clone, Debug, Default)]
pub struct PathFollower {
    pub path: Vec<WorldPos>,
    pub path_index: usize,
    /// Goal the current path was planned for.
    pub path_goal: Option<WorldPos>,
    pub jitter: JitterTracker,
    /// Seconds spent approaching the current node.
    pub node_elapsed: f32,
    /// Time allowed for the current node, fixed when the approach starts.
    pub node_time_limit: Option<f32>,
    /// Jitter replans since the last node reached by travel. Kept across
    /// replans toward the same goal.
    pub jitter_replans: u32,
    pub waiting_door: Option<BuildingId>,
    pub passing_door: Option<DoorPass>,
    /// Goal whose last plan failed; no automatic retry until it changes.
    pub failed_goal: Option<WorldPos>,
}

impl PathFollower {
    pub fn has_path(&self) -> bool {
        self.path_index < self.path.len()
    }

    pub fn current_node(&self) -> Option<WorldPos> {
        self.path.get(self.path_index).copied()
    }

    pub fn set_path(&mut self, path: Vec<WorldPos>, goal: WorldPos) {
        if self.path_goal != Some(goal) {
            self.jitter_replans = 0;
        }
        self.path = path;
        self.path_index = 0;
        self.path_goal = Some(goal);
        self.jitter.reset();
        self.node_elapsed = 0.0;
        self.node_time_limit = None;
        self.failed_goal = None;
    }

    /// Drop the path. Door bookkeeping is left to the caller, which owns
    /// the gate.
    pub fn clear_path(&mut self) {
        self.path.clear();
        self.path_index = 0;
        self.path_goal = None;
        self.jitter.reset();
        self.node_elapsed = 0.0;
        self.node_time_limit = None;
    }

    fn advance(&mut self) {
        self.path_index += 1;
        self.jitter.reset();
        self.node_elapsed = 0.0;
        self.node_time_limit = None;
    }

    fn reach_node(&mut self) {
        self.advance();
        self.jitter_replans = 0;
    }
}

/// A mobile entity as seen by the navigation core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MobileAgent {
    pub id: AgentId,
    pub position: WorldPos,
    pub facing: Facing,
    pub profile: MotionProfile,
    #[serde(skip)]
    pub follow: PathFollower,
}

impl MobileAgent {
    pub fn new(id: AgentId, position: WorldPos, profile: MotionProfile) -> Self {
        Self {
            id,
            position,
            facing: Facing::default(),
            profile,
            follow: PathFollower::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowOutcome {
    NoPath,
    Advancing,
    /// Jitter escape skipped the current node.
    JitterSkip,
    /// The last node was reached; the path is cleared.
    PathComplete,
    WaitingForDoor,
    /// Jitter escape far from the node; the caller should replan.
    JitterReplan,
    /// The next node has turned solid; the caller should replan.
    Blocked,
}

#[derive(Clone, Debug)]
pub struct MovementController {
    params: MovementParams,
}

impl MovementController {
    pub fn new(params: MovementParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MovementParams {
        &self.params
    }

    /// Speed of `agent` on the tile it currently occupies.
    pub fn speed_at(&self, grid: &TerrainCostGrid, agent: &MobileAgent) -> f32 {
        agent.profile.effective_speed() / grid.cost_at_pos(agent.position)
    }

    /// Time allowed to reach `node`, `dist` away: the configured floor or a
    /// multiple of the travel time at the slower of the agent's tile and the
    /// node's tile, whichever is longer.
    fn node_time_allowance(
        &self,
        grid: &TerrainCostGrid,
        agent: &MobileAgent,
        node: WorldPos,
        dist: f32,
    ) -> f32 {
        let cost = grid
            .cost_at_pos(agent.position)
            .max(grid.cost_at_pos(node));
        let speed = agent.profile.effective_speed() / cost;
        if speed <= 0.0 {
            return f32::INFINITY;
        }
        self.params
            .max_node_time_secs
            .max(self.params.node_time_factor * dist / speed)
    }

    /// Advance `agent` along its path for one tick of `dt` seconds.
    pub fn follow<D: DoorGate + ?Sized>(
        &self,
        grid: &TerrainCostGrid,
        agent: &mut MobileAgent,
        doors: &mut D,
        dt: f32,
    ) -> FollowOutcome {
        self.release_passed_door(grid, agent, doors);
        if !agent.follow.has_path() {
            return FollowOutcome::NoPath;
        }

        if let Some(door) = agent.follow.waiting_door {
            if !doors.is_open_for(door, agent.id) {
                return FollowOutcome::WaitingForDoor;
            }
            agent.follow.waiting_door = None;
            if let Some(node) = agent.follow.current_node() {
                self.grant_door(agent, doors, door, grid.tile_of(node));
            }
        }

        let mut skipped = false;
        if let Some(node) = agent.follow.current_node() {
            let dist = agent.position.distance(node);
            let near = dist <= self.params.node_arrival_radius + self.params.jitter_hysteresis;
            let score = agent.follow.jitter.observe(dist, near);
            let allowed = self.node_time_allowance(grid, agent, node, dist);
            let limit = *agent.follow.node_time_limit.get_or_insert(allowed);
            agent.follow.node_elapsed += dt;
            if score >= self.params.jitter_threshold || agent.follow.node_elapsed > limit {
                if dist > self.params.jitter_snap_radius {
                    return FollowOutcome::JitterReplan;
                }
                agent.position = node;
                agent.follow.advance();
                if !agent.follow.has_path() {
                    return self.finish(grid, agent, doors);
                }
                skipped = true;
            }
        }

        let mut remaining = self.speed_at(grid, agent) * dt;
        let half_tile = grid.tile_size / 2.0;
        while let Some(node) = agent.follow.current_node() {
            let node_tile = grid.tile_of(node);
            if grid.is_solid(node_tile) {
                return FollowOutcome::Blocked;
            }
            let dist = agent.position.distance(node);

            if let Some(door) = doors.door_at(node_tile)
                && grid.tile_of(agent.position) != node_tile
                && agent.follow.passing_door.is_none_or(|p| p.door != door)
                && dist - half_tile <= remaining
            {
                doors.enqueue(door, agent.id);
                if !doors.is_open_for(door, agent.id) {
                    agent.follow.waiting_door = Some(door);
                    agent.position = grid.clamp(agent.position);
                    return FollowOutcome::WaitingForDoor;
                }
                self.grant_door(agent, doors, door, node_tile);
            }

            if dist <= remaining + ARRIVE_EPSILON {
                agent.position = node;
                remaining = (remaining - dist).max(0.0);
                agent.follow.reach_node();
                self.mark_door_entered(grid, agent);
                if !agent.follow.has_path() {
                    return self.finish(grid, agent, doors);
                }
                if remaining <= 0.0 {
                    break;
                }
                continue;
            }

            if dist > self.params.facing_min_distance {
                agent.facing = Facing::from_vector(node.x - agent.position.x, node.y - agent.position.y);
            }
            agent.position = grid.clamp(agent.position.step_toward(node, remaining));
            self.mark_door_entered(grid, agent);
            break;
        }

        if skipped {
            FollowOutcome::JitterSkip
        } else {
            FollowOutcome::Advancing
        }
    }

    fn finish<D: DoorGate + ?Sized>(
        &self,
        grid: &TerrainCostGrid,
        agent: &mut MobileAgent,
        doors: &mut D,
    ) -> FollowOutcome {
        agent.follow.clear_path();
        self.mark_door_entered(grid, agent);
        self.release_passed_door(grid, agent, doors);
        FollowOutcome::PathComplete
    }

    /// Record passage through `door`, letting go of any earlier door still
    /// held (adjacent doorways).
    fn grant_door<D: DoorGate + ?Sized>(
        &self,
        agent: &mut MobileAgent,
        doors: &mut D,
        door: BuildingId,
        tile: TileCoord,
    ) {
        let pass = DoorPass {
            door,
            tile,
            entered: false,
        };
        if let Some(prev) = agent.follow.passing_door.replace(pass)
            && prev.door != door
        {
            doors.release(prev.door, agent.id);
        }
    }

    fn mark_door_entered(&self, grid: &TerrainCostGrid, agent: &mut MobileAgent) {
        let here = grid.tile_of(agent.position);
        if let Some(pass) = agent.follow.passing_door.as_mut()
            && pass.tile == here
        {
            pass.entered = true;
        }
    }

    /// Release the held door once the agent has been on it and left.
    fn release_passed_door<D: DoorGate + ?Sized>(
        &self,
        grid: &TerrainCostGrid,
        agent: &mut MobileAgent,
        doors: &mut D,
    ) {
        let here = grid.tile_of(agent.position);
        if let Some(pass) = agent.follow.passing_door
            && pass.entered
            && pass.tile != here
        {
            doors.release(pass.door, agent.id);
            agent.follow.passing_door = None;
        }
    }

    /// Release doors the agent has not physically entered yet. Used when a
    /// new path replaces the old one; a door the agent stands in is kept
    /// until it steps off.
    pub fn release_unentered_doors<D: DoorGate + ?Sized>(
        &self,
        agent: &mut MobileAgent,
        doors: &mut D,
    ) {
        if let Some(door) = agent.follow.waiting_door.take() {
            doors.release(door, agent.id);
        }
        if let Some(pass) = agent.follow.passing_door
            && !pass.entered
        {
            doors.release(pass.door, agent.id);
            agent.follow.passing_door = None;
        }
    }

    /// Release every door `agent` holds or waits on.
    pub fn release_doors<D: DoorGate + ?Sized>(&self, agent: &mut MobileAgent, doors: &mut D) {
        if let Some(door) = agent.follow.waiting_door.take() {
            doors.release(door, agent.id);
        }
        if let Some(pass) = agent.follow.passing_door.take() {
            doors.release(pass.door, agent.id);
        }
    }
}
