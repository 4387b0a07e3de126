// Approach-point search for circular interaction targets.
//
// Trees and rocks are circles that don't line up with tiles, and their own
// tiles are solid, so an agent can't path "to" them. `ApproachPointResolver`
// picks the tile center an agent should walk to in order to interact:
//
// 1. Sample `sample_count` angles on a ring of radius
//    `max(min_ring_radius, radius + interact - inward_bias)`, starting at
//    the bearing toward the agent and alternating +/- around it.
// 2. Snap each sample to its tile center, dedupe by tile, drop
//    out-of-bounds and solid tiles, and order the rest by distance to the
//    agent.
// 3. Path to up to `max_evaluated` candidates and score each by the summed
//    cost of the tiles entered, discounted by `road_bonus` when the final
//    tile is road (cost <= `road_cost_threshold`). Lowest score wins, ties
//    to the shorter path; a candidate that is short and cheap enough ends
//    the search early.
//
// When sampling leaves no candidates the resolver walks from the ring
// toward the agent in `ray_step` increments and takes the first open tile
// center; failing that it returns the raw ring point facing the agent.
// Neither fallback is path-checked. `None` means every evaluated candidate
// was unreachable.
//
// See also: `navigator.rs` which wires the path source (cache + A*),
// `sim.rs` which uses the result for gather orders.

use crate::config::ApproachParams;
use crate::grid::TerrainCostGrid;
use crate::pathfinding::PathResult;
use crate::types::{TileCoord, WorldPos};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// A circular interaction target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: WorldPos,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ApproachKind {
    /// Reached by a computed path of `len` nodes and adjusted `cost`.
    Pathed { cost: f32, len: usize },
    /// First open tile on the ray from the ring toward the agent.
    RayWalk,
    /// Un-snapped point on the interaction ring; degenerate map.
    RawRing,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApproachPoint {
    pub pos: WorldPos,
    pub kind: ApproachKind,
}

#[derive(Clone, Debug)]
pub struct ApproachPointResolver {
    params: ApproachParams,
}

impl ApproachPointResolver {
    pub fn new(params: ApproachParams) -> Self {
        Self { params }
    }

    pub fn ring_radius(&self, circle: &Circle, interact: f32) -> f32 {
        (circle.radius + interact - self.params.inward_bias).max(self.params.min_ring_radius)
    }

    /// Candidate tiles in evaluation order.
    pub fn candidates(
        &self,
        grid: &TerrainCostGrid,
        agent: WorldPos,
        circle: &Circle,
        interact: f32,
    ) -> Vec<TileCoord> {
        let ring = self.ring_radius(circle, interact);
        let bearing = facing_bearing(circle.center, agent);
        let n = self.params.sample_count.max(1);
        let step = TAU / n as f32;

        let mut tiles: Vec<TileCoord> = Vec::with_capacity(n as usize);
        for i in 0..n {
            let k = (i + 1) / 2;
            let sign = if i % 2 == 1 { 1.0 } else { -1.0 };
            let angle = bearing + sign * k as f32 * step;
            let tile = grid.tile_of(circle.center.offset_polar(angle, ring));
            if !grid.in_bounds(tile) || grid.is_solid(tile) || tiles.contains(&tile) {
                continue;
            }
            tiles.push(tile);
        }
        // Stable: equal distances keep sampling order.
        tiles.sort_by(|a, b| {
            let da = grid.tile_center(*a).distance_sq(agent);
            let db = grid.tile_center(*b).distance_sq(agent);
            da.total_cmp(&db)
        });
        tiles
    }

    /// Adjusted cost of reaching a candidate along `path`.
    pub fn score(&self, grid: &TerrainCostGrid, path: &PathResult) -> f32 {
        let raw: f32 = path.tiles.iter().skip(1).map(|&t| grid.cost_at(t)).sum();
        match path.tiles.last() {
            Some(&last) if grid.cost_at(last) <= self.params.road_cost_threshold => {
                raw * self.params.road_bonus
            }
            _ => raw,
        }
    }

    /// Best point from which `agent` can interact with `circle`.
    /// `path_to(from, to)` supplies paths; `None` means unreachable.
    pub fn resolve<P>(
        &self,
        grid: &TerrainCostGrid,
        agent: WorldPos,
        circle: &Circle,
        interact: f32,
        mut path_to: P,
    ) -> Option<ApproachPoint>
    where
        P: FnMut(WorldPos, WorldPos) -> Option<PathResult>,
    {
        let candidates = self.candidates(grid, agent, circle, interact);
        if candidates.is_empty() {
            return Some(self.fallback(grid, agent, circle, interact));
        }

        let agent_tile = grid.tile_of(agent);
        let mut best: Option<(f32, usize, WorldPos)> = None;
        for tile in candidates.into_iter().take(self.params.max_evaluated) {
            let target = grid.tile_center(tile);
            let (cost, len) = if tile == agent_tile {
                (0.0, 1)
            } else {
                match path_to(agent, target) {
                    Some(path) => (self.score(grid, &path), path.len()),
                    None => continue,
                }
            };
            let better = match best {
                None => true,
                Some((best_cost, best_len, _)) => {
                    cost < best_cost || (cost == best_cost && len < best_len)
                }
            };
            if better {
                best = Some((cost, len, target));
            }
            if len <= self.params.good_enough_len && cost <= self.params.good_enough_cost {
                break;
            }
        }

        match best {
            Some((cost, len, pos)) => Some(ApproachPoint {
                pos,
                kind: ApproachKind::Pathed { cost, len },
            }),
            None => {
                debug!(
                    "no reachable approach point around {} from {}",
                    circle.center, agent
                );
                None
            }
        }
    }

    /// Ray walk from the ring toward the agent, then the raw ring point.
    fn fallback(
        &self,
        grid: &TerrainCostGrid,
        agent: WorldPos,
        circle: &Circle,
        interact: f32,
    ) -> ApproachPoint {
        let ring = self.ring_radius(circle, interact);
        let bearing = facing_bearing(circle.center, agent);
        let ring_point = circle.center.offset_polar(bearing, ring);

        let total = ring_point.distance(agent);
        let step = self.params.ray_step.max(1.0);
        let mut travelled = 0.0;
        let mut pos = ring_point;
        loop {
            let tile = grid.tile_of(pos);
            if grid.in_bounds(tile) && !grid.is_solid(tile) {
                return ApproachPoint {
                    pos: grid.tile_center(tile),
                    kind: ApproachKind::RayWalk,
                };
            }
            if travelled >= total {
                break;
            }
            pos = pos.step_toward(agent, step);
            travelled += step;
        }

        warn!(
            "degenerate approach search around {}: using raw ring point {}",
            circle.center, ring_point
        );
        ApproachPoint {
            pos: ring_point,
            kind: ApproachKind::RawRing,
        }
    }
}

/// Bearing from the target to the agent; east when they coincide.
fn facing_bearing(center: WorldPos, agent: WorldPos) -> f32 {
    if center.distance_sq(agent) <= f32::EPSILON {
        0.0
    } else {
        center.bearing_to(agent)
    }
}
