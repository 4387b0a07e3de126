// Data-driven game configuration.
//
// All tunable navigation parameters live here in `GameConfig`, loaded from
// JSON at startup. The navigation core never uses magic numbers; it reads
// from the config. This enables balance iteration without recompilation.
//
// Parameters are grouped into nested structs by the subsystem that reads
// them: `PathCacheParams` (path_cache.rs), `PathQueueParams`
// (path_queue.rs), `MovementParams` (movement.rs, navigator.rs) and
// `ApproachParams` (approach.rs). Per-terrain cost and solidity are a table
// keyed by `TerrainType`, consumed by `nav_builder.rs`.
//
// See also: `sim.rs` which owns the `GameConfig` as part of `SimState`,
// `navigator.rs` which copies the relevant groups into each subsystem.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic; two runs with identical configs and commands produce
// identical results.

use crate::error::NavError;
use crate::movement::MotionProfile;
use crate::types::TerrainType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Movement properties of one terrain type.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainProps {
    /// Movement-cost multiplier. 1.0 = baseline, < 1.0 faster (road),
    /// > 1.0 slower (mud). Must be > 0 even for solid terrain.
    pub cost: f32,
    /// Impassable regardless of cost.
    pub solid: bool,
}

/// Path cache housekeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathCacheParams {
    /// Entries older than this are evicted by `clean_cache` regardless of
    /// validity.
    pub max_age_secs: f64,
    /// How often (in sim ticks) the harness runs the age-based cleanup.
    pub clean_interval_ticks: u64,
}

/// Asynchronous path request queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathQueueParams {
    /// When false, `move_along_path` plans synchronously through the path
    /// finder instead of queueing.
    pub async_enabled: bool,
    /// Outstanding requests older than this may be answered by a one-off
    /// synchronous fallback computation.
    pub fallback_timeout_ms: u64,
    /// Two goals closer than this (world units) count as the same goal for
    /// duplicate-request suppression.
    pub goal_tolerance: f32,
    /// Maximum number of queued requests resolved per `pump` call.
    pub budget_per_tick: usize,
}

/// Per-agent path following and jitter detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MovementParams {
    /// Tile-center distance between the new goal and the goal the current
    /// path was planned for above which the path is replanned.
    pub replan_distance: f32,
    /// Arrive tolerance used by the harness when a goal does not specify one.
    pub default_arrive_radius: f32,
    /// Radius around a path node considered "near" for jitter detection.
    pub node_arrival_radius: f32,
    /// Extra slack added to `node_arrival_radius` before a trend reversal
    /// counts as jitter.
    pub jitter_hysteresis: f32,
    /// Jitter score at which the controller force-resolves.
    pub jitter_threshold: u32,
    /// Floor of the time allowed for approaching a single node before the
    /// controller force-resolves.
    pub max_node_time_secs: f32,
    /// The per-node allowance also grows to this multiple of the expected
    /// travel time, measured at the slower of the two tiles involved.
    pub node_time_factor: f32,
    /// Back-to-back jitter replans toward one goal before the move fails.
    pub max_jitter_replans: u32,
    /// Within this distance a force-resolve simply advances past the node;
    /// farther away it replans.
    pub jitter_snap_radius: f32,
    /// Facing is only updated while farther than this from the target node.
    pub facing_min_distance: f32,
}

/// Approach-point search around circular targets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApproachParams {
    /// Number of candidate angles sampled around the ring.
    pub sample_count: u32,
    /// Maximum number of candidates scored by an actual path search.
    pub max_evaluated: usize,
    /// Lower bound on the sampling ring radius.
    pub min_ring_radius: f32,
    /// Inward bias subtracted from `radius + interact` for the ring radius.
    pub inward_bias: f32,
    /// Final tiles at or below this cost count as road.
    pub road_cost_threshold: f32,
    /// Cost multiplier applied to candidates ending on road.
    pub road_bonus: f32,
    /// Early exit: a candidate whose path has at most this many nodes ...
    pub good_enough_len: usize,
    /// ... and at most this adjusted cost is accepted immediately.
    pub good_enough_cost: f32,
    /// Step length (world units) of the ray-walk fallback.
    pub ray_step: f32,
}

/// Top-level game configuration. Loaded from JSON, never mutated at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    /// Real-world milliseconds per simulation tick; also the sim clock step.
    pub tick_duration_ms: u32,

    /// Side length of one tile in world units.
    pub tile_size: f32,

    /// World dimensions in tiles.
    pub world_cols: u32,
    pub world_rows: u32,

    /// Side length (in tiles) of the square chunks used as cache
    /// invalidation regions.
    pub region_size_tiles: u32,

    /// Cost and solidity per terrain type. Types missing from the table
    /// behave like baseline open ground.
    pub terrain: BTreeMap<TerrainType, TerrainProps>,

    /// Cost multiplier of door tiles (doors are passable by design).
    pub door_cost: f32,

    pub path_cache: PathCacheParams,
    pub path_queue: PathQueueParams,
    pub movement: MovementParams,
    pub approach: ApproachParams,

    /// Motion profile given to newly spawned agents.
    pub default_motion: MotionProfile,

    /// How far from a resource's edge an agent can harvest it.
    pub gather_reach: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut terrain = BTreeMap::new();
        let open = |cost| TerrainProps { cost, solid: false };
        terrain.insert(TerrainType::Grass, open(1.0));
        terrain.insert(TerrainType::Road, open(0.5));
        terrain.insert(TerrainType::Path, open(0.7));
        terrain.insert(TerrainType::Mud, open(1.8));
        terrain.insert(TerrainType::Rough, open(1.3));
        terrain.insert(
            TerrainType::Mountain,
            TerrainProps {
                cost: 1.0,
                solid: true,
            },
        );
        terrain.insert(
            TerrainType::Water,
            TerrainProps {
                cost: 1.0,
                solid: true,
            },
        );

        Self {
            tick_duration_ms: 50,
            tile_size: 32.0,
            world_cols: 64,
            world_rows: 64,
            region_size_tiles: 16,
            terrain,
            door_cost: 1.0,
            path_cache: PathCacheParams {
                max_age_secs: 30.0,
                clean_interval_ticks: 200,
            },
            path_queue: PathQueueParams {
                async_enabled: true,
                fallback_timeout_ms: 750,
                goal_tolerance: 16.0,
                budget_per_tick: 8,
            },
            movement: MovementParams {
                replan_distance: 24.0,
                default_arrive_radius: 6.0,
                node_arrival_radius: 4.0,
                jitter_hysteresis: 4.0,
                jitter_threshold: 6,
                max_node_time_secs: 4.0,
                node_time_factor: 3.0,
                max_jitter_replans: 3,
                jitter_snap_radius: 12.0,
                facing_min_distance: 2.0,
            },
            approach: ApproachParams {
                sample_count: 16,
                max_evaluated: 8,
                min_ring_radius: 6.0,
                inward_bias: 2.0,
                road_cost_threshold: 0.7,
                road_bonus: 0.85,
                good_enough_len: 12,
                good_enough_cost: 12.0,
                ray_step: 16.0,
            },
            default_motion: MotionProfile::default(),
            gather_reach: 12.0,
        }
    }
}

impl GameConfig {
    /// Parse a config from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, NavError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that would corrupt the nav grid or divide by zero.
    pub fn validate(&self) -> Result<(), NavError> {
        if !(self.tile_size > 0.0) {
            return Err(NavError::InvalidConfig(format!(
                "tile_size must be positive, got {}",
                self.tile_size
            )));
        }
        if self.world_cols == 0 || self.world_rows == 0 {
            return Err(NavError::InvalidConfig(format!(
                "world must be at least 1x1 tiles, got {}x{}",
                self.world_cols, self.world_rows
            )));
        }
        if self.region_size_tiles == 0 {
            return Err(NavError::InvalidConfig(
                "region_size_tiles must be at least 1".into(),
            ));
        }
        for (terrain, props) in &self.terrain {
            if !(props.cost > 0.0) {
                return Err(NavError::InvalidConfig(format!(
                    "terrain {terrain:?} has non-positive cost {}",
                    props.cost
                )));
            }
        }
        if !(self.door_cost > 0.0) {
            return Err(NavError::InvalidConfig(format!(
                "door_cost must be positive, got {}",
                self.door_cost
            )));
        }
        if self.approach.sample_count == 0 {
            return Err(NavError::InvalidConfig(
                "approach.sample_count must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Props for a terrain type; unlisted types are baseline open ground.
    pub fn terrain_props(&self, terrain: TerrainType) -> TerrainProps {
        self.terrain.get(&terrain).copied().unwrap_or(TerrainProps {
            cost: 1.0,
            solid: false,
        })
    }

    /// World extent in world units.
    pub fn world_size(&self) -> (f32, f32) {
        (
            self.world_cols as f32 * self.tile_size,
            self.world_rows as f32 * self.tile_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        GameConfig::default().validate().unwrap();
    }

    #[test]
    fn default_config_serializes() {
        let config = GameConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored = GameConfig::from_json(&json).unwrap();
        assert_eq!(config.tile_size, restored.tile_size);
        assert_eq!(config.world_cols, restored.world_cols);
        assert_eq!(
            config.path_queue.fallback_timeout_ms,
            restored.path_queue.fallback_timeout_ms
        );
        assert_eq!(
            restored.terrain[&TerrainType::Road],
            TerrainProps {
                cost: 0.5,
                solid: false
            }
        );
        assert!(restored.terrain[&TerrainType::Mountain].solid);
    }

    #[test]
    fn rejects_non_positive_terrain_cost() {
        let mut config = GameConfig::default();
        config.terrain.insert(
            TerrainType::Mud,
            TerrainProps {
                cost: 0.0,
                solid: false,
            },
        );
        assert!(matches!(config.validate(), Err(NavError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            GameConfig::from_json("{ not json"),
            Err(NavError::Json(_))
        ));
    }

    #[test]
    fn missing_terrain_defaults_to_open_ground() {
        let mut config = GameConfig::default();
        config.terrain.remove(&TerrainType::Rough);
        let props = config.terrain_props(TerrainType::Rough);
        assert_eq!(props.cost, 1.0);
        assert!(!props.solid);
    }
}
