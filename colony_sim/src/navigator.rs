// Navigation facade: the surface the rest of the simulation talks to.
//
// `Navigator` owns one of everything: the `TerrainCostGrid`, the
// `NavGridBuilder` that writes it, the `RegionVersionManager` and
// `PathCache` that keep cached paths honest, the `AsyncPathRequestQueue`,
// a reusable `PathFinder`, the `MovementController` and the
// `ApproachPointResolver`.
//
// Structural changes go through `rebuild_nav_grid` /
// `rebuild_nav_grid_partial`, which rebuild, bump the versions of every
// region the rebuilt rectangle overlaps and proactively drop cache entries
// touching them, in that order.
//
// `move_along_path` is the per-tick driver for one agent:
//
//   arrived? -> Arrived
//   same goal failed before? -> Failed (no retry until the goal changes)
//   no path, already in the goal tile -> walk straight at the target
//   no path / goal drifted -> plan (async request, fallback on timeout,
//                             or synchronous when async is off)
//   follow one tick -> jitter / blocked escapes replan synchronously once
//
// `pump` resolves queued requests. The batch is solved in parallel with
// rayon (one `PathFinder` per worker); results come back in batch order
// and are committed sequentially, so the outcome does not depend on
// thread scheduling.
//
// See also: `sim.rs` which calls into this once per tick, `path_queue.rs`
// for the request lifecycle, `movement.rs` for per-tick following.
//
// **Critical constraint: determinism.** All time comes from the sim clock
// pushed in through `set_clock`.

use crate::approach::{ApproachPoint, ApproachPointResolver, Circle};
use crate::config::{GameConfig, PathCacheParams, PathQueueParams};
use crate::door::DoorGate;
use crate::error::NavError;
use crate::grid::TerrainCostGrid;
use crate::movement::{FollowOutcome, MobileAgent, MovementController};
use crate::nav_builder::NavGridBuilder;
use crate::path_cache::{CacheKey, CacheStats, PathCache};
use crate::path_queue::{
    AsyncPathRequestQueue, PathJob, PathRequest, PathResolution, QueueStats, RequestOutcome,
};
use crate::pathfinding::{PathFailure, PathFinder, PathResult};
use crate::region::RegionVersionManager;
use crate::types::{Facing, PathPriority, RegionId, TileRect, WorldPos};
use crate::world::WorldState;
use log::{debug, warn};
use rayon::prelude::*;
use std::fmt;

/// Where an agent is headed this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveOrder {
    pub target: WorldPos,
    pub arrive_radius: f32,
    pub priority: PathPriority,
}

/// Result of one `move_along_path` tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveStatus {
    Idle,
    PathPending,
    Moving,
    WaitingForDoor,
    Arrived,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct NavCounters {
    paths_computed: u64,
    no_path_results: u64,
    nodes_expanded: u64,
    jitter_escapes: u64,
    replans: u64,
}

/// Introspection snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct NavStats {
    pub cache: CacheStats,
    pub queue: QueueStats,
    pub cache_entries: usize,
    pub paths_computed: u64,
    pub no_path_results: u64,
    /// A* nodes expanded across every search.
    pub nodes_expanded: u64,
    pub jitter_escapes: u64,
    pub replans: u64,
    pub queue_depth: usize,
    pub pending_requests: usize,
    pub region_versions: Vec<(RegionId, u64)>,
}

impl NavStats {
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache.hits + self.cache.misses;
        if total == 0 {
            0.0
        } else {
            self.cache.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for NavStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "paths computed: {} ({} without a path), {} nodes expanded",
            self.paths_computed, self.no_path_results, self.nodes_expanded
        )?;
        writeln!(
            f,
            "cache: {} hits / {} misses ({:.1}% hit rate), {} entries, {} stale, {} invalidated, {} aged out",
            self.cache.hits,
            self.cache.misses,
            self.cache_hit_rate() * 100.0,
            self.cache_entries,
            self.cache.stale_evictions,
            self.cache.invalidations,
            self.cache.age_evictions
        )?;
        writeln!(
            f,
            "queue: {} enqueued, {} superseded, {} duplicates, {} stale dropped, {} fallbacks, depth {}, pending {}",
            self.queue.enqueued,
            self.queue.superseded,
            self.queue.duplicates_suppressed,
            self.queue.stale_dropped,
            self.queue.fallbacks,
            self.queue_depth,
            self.pending_requests
        )?;
        writeln!(
            f,
            "movement: {} jitter escapes, {} replans",
            self.jitter_escapes, self.replans
        )?;
        let changed: Vec<String> = self
            .region_versions
            .iter()
            .filter(|&&(_, v)| v > 0)
            .map(|(id, v)| format!("{}={}", id.0, v))
            .collect();
        write!(f, "region versions (non-zero): [{}]", changed.join(", "))
    }
}

/// Cache-backed path lookup over borrowed navigator parts.
struct PathSource<'a> {
    grid: &'a TerrainCostGrid,
    versions: &'a RegionVersionManager,
    cache: &'a mut PathCache,
    finder: &'a mut PathFinder,
    counters: &'a mut NavCounters,
    now_secs: f64,
}

impl PathSource<'_> {
    fn path(&mut self, start: WorldPos, goal: WorldPos) -> Option<PathResult> {
        let key = CacheKey::from_world(self.grid, start, goal);
        if let Some(path) = self.cache.check(key, self.versions) {
            return Some(path);
        }
        let result = self.finder.find_path(self.grid, start, goal);
        self.counters.nodes_expanded += self.finder.last_expanded() as u64;
        record_result(self.grid, self.versions, self.cache, self.counters, key, &result, self.now_secs);
        result.ok()
    }
}

/// Stats bookkeeping and cache fill for a fresh search result.
fn record_result(
    grid: &TerrainCostGrid,
    versions: &RegionVersionManager,
    cache: &mut PathCache,
    counters: &mut NavCounters,
    key: CacheKey,
    result: &Result<PathResult, PathFailure>,
    now_secs: f64,
) {
    counters.paths_computed += 1;
    match result {
        Ok(path) => {
            let snapshot = versions.snapshot_for_tiles(&path.tiles);
            cache.store(key, path.clone(), snapshot, now_secs);
        }
        Err(failure) => {
            counters.no_path_results += 1;
            debug!(
                "no path {} -> {}: {:?}",
                grid.tile_center(key.start),
                grid.tile_center(key.goal),
                failure
            );
        }
    }
}

pub struct Navigator {
    grid: TerrainCostGrid,
    builder: NavGridBuilder,
    versions: RegionVersionManager,
    cache: PathCache,
    queue: AsyncPathRequestQueue,
    finder: PathFinder,
    movement: MovementController,
    approach: ApproachPointResolver,
    cache_params: PathCacheParams,
    queue_params: PathQueueParams,
    counters: NavCounters,
    clock_ms: u64,
}

/// An empty placeholder (0x0 grid). Stands in for the navigator on a freshly
/// deserialized `SimState` until `rebuild_transient_state` replaces it.
impl Default for Navigator {
    fn default() -> Self {
        let config = GameConfig::default();
        Self {
            grid: TerrainCostGrid::new(0, 0, config.tile_size),
            builder: NavGridBuilder::new(&config),
            versions: RegionVersionManager::new(0, 0, config.region_size_tiles),
            cache: PathCache::new(),
            queue: AsyncPathRequestQueue::new(
                config.path_queue.goal_tolerance,
                config.path_queue.fallback_timeout_ms,
            ),
            finder: PathFinder::new(),
            movement: MovementController::new(config.movement),
            approach: ApproachPointResolver::new(config.approach),
            cache_params: config.path_cache,
            queue_params: config.path_queue,
            counters: NavCounters::default(),
            clock_ms: 0,
        }
    }
}

impl Navigator {
    /// Build the navigation core for `world` and run the initial full
    /// rebuild.
    pub fn new(config: &GameConfig, world: &WorldState) -> Result<Self, NavError> {
        config.validate()?;
        let mut nav = Self {
            grid: TerrainCostGrid::new(world.cols, world.rows, world.tile_size),
            builder: NavGridBuilder::new(config),
            versions: RegionVersionManager::new(world.cols, world.rows, config.region_size_tiles),
            cache: PathCache::new(),
            queue: AsyncPathRequestQueue::new(
                config.path_queue.goal_tolerance,
                config.path_queue.fallback_timeout_ms,
            ),
            finder: PathFinder::new(),
            movement: MovementController::new(config.movement.clone()),
            approach: ApproachPointResolver::new(config.approach.clone()),
            cache_params: config.path_cache.clone(),
            queue_params: config.path_queue.clone(),
            counters: NavCounters::default(),
            clock_ms: 0,
        };
        nav.rebuild_nav_grid(world)?;
        Ok(nav)
    }

    pub fn grid(&self) -> &TerrainCostGrid {
        &self.grid
    }

    pub fn versions(&self) -> &RegionVersionManager {
        &self.versions
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    pub fn queue(&self) -> &AsyncPathRequestQueue {
        &self.queue
    }

    pub fn movement(&self) -> &MovementController {
        &self.movement
    }

    /// Advance the navigator's notion of "now" (sim milliseconds).
    pub fn set_clock(&mut self, now_ms: u64) {
        self.clock_ms = now_ms;
    }

    fn now_secs(&self) -> f64 {
        self.clock_ms as f64 / 1000.0
    }

    /// Bump versions for `rect` and drop cache entries that cross it. The
    /// rect is widened by one tile: a diagonal step is legal or not
    /// depending on its two side tiles, which may lie in a neighboring
    /// region, and every tile a changed tile can pinch is adjacent to it.
    fn invalidate(&mut self, rect: TileRect) {
        let regions = self.versions.mark_rect_changed(rect.expanded(1));
        let removed = self.cache.invalidate_for_regions(&regions);
        if !regions.is_empty() {
            debug!(
                "invalidated {} region(s), dropped {} cached path(s)",
                regions.len(),
                removed
            );
        }
    }

    /// Rebuild the whole grid from `world`. Also safe right after a load:
    /// a resized world gets a fresh grid and region layout.
    pub fn rebuild_nav_grid(&mut self, world: &WorldState) -> Result<(), NavError> {
        if world.cols != self.grid.cols
            || world.rows != self.grid.rows
            || world.tile_size != self.grid.tile_size
        {
            self.grid = TerrainCostGrid::new(world.cols, world.rows, world.tile_size);
            self.versions.reset_layout(world.cols, world.rows);
            self.cache.clear();
        }
        let rect = self.builder.rebuild_full(world, &mut self.grid)?;
        self.invalidate(rect);
        Ok(())
    }

    /// Rebuild the tiles within `radius` of `center`.
    pub fn rebuild_nav_grid_partial(
        &mut self,
        world: &WorldState,
        center: WorldPos,
        radius: f32,
    ) -> Result<(), NavError> {
        let rect = self
            .builder
            .rebuild_partial(world, &mut self.grid, center, radius)?;
        self.invalidate(rect);
        Ok(())
    }

    fn source(&mut self) -> PathSource<'_> {
        let now_secs = self.now_secs();
        PathSource {
            grid: &self.grid,
            versions: &self.versions,
            cache: &mut self.cache,
            finder: &mut self.finder,
            counters: &mut self.counters,
            now_secs,
        }
    }

    /// Synchronous, cache-backed path query. `None` means "can't get there".
    pub fn compute_path(&mut self, start: WorldPos, goal: WorldPos) -> Option<PathResult> {
        self.source().path(start, goal)
    }

    /// Primary entry point for agent code: cache hit, or a queued request
    /// resolved by a later `pump`.
    pub fn request_path_async(&mut self, req: PathRequest) -> RequestOutcome {
        self.queue.request(
            req,
            &mut self.cache,
            &self.versions,
            &self.grid,
            self.clock_ms,
        )
    }

    /// Resolve up to `budget_per_tick` queued requests. Returns the
    /// resolutions that are still current; stale ones are dropped.
    pub fn pump(&mut self) -> Vec<PathResolution> {
        let jobs = self.queue.take_batch(self.queue_params.budget_per_tick);
        if jobs.is_empty() {
            return Vec::new();
        }
        let grid = &self.grid;
        let results: Vec<(PathJob, Result<PathResult, PathFailure>, usize)> = jobs
            .into_par_iter()
            .map_init(PathFinder::new, |finder, job| {
                let result = finder.find_path(grid, job.start, job.goal);
                (job, result, finder.last_expanded())
            })
            .collect();

        let now_secs = self.now_secs();
        let mut resolutions = Vec::with_capacity(results.len());
        for (job, result, expanded) in results {
            let key = CacheKey::from_world(&self.grid, job.start, job.goal);
            self.counters.nodes_expanded += expanded as u64;
            record_result(
                &self.grid,
                &self.versions,
                &mut self.cache,
                &mut self.counters,
                key,
                &result,
                now_secs,
            );
            if let Some(resolution) = self.queue.complete(&job, result.ok()) {
                resolutions.push(resolution);
            }
        }
        resolutions
    }

    /// Commit a resolution to its agent. Returns false if it belongs to a
    /// different agent.
    pub fn apply_resolution<D: DoorGate + ?Sized>(
        &mut self,
        agent: &mut MobileAgent,
        doors: &mut D,
        resolution: PathResolution,
    ) -> bool {
        if resolution.agent != agent.id {
            return false;
        }
        self.movement.release_unentered_doors(agent, doors);
        match resolution.path {
            Some(path) => agent.follow.set_path(path.nodes, resolution.goal),
            None => {
                agent.follow.clear_path();
                agent.follow.failed_goal = Some(resolution.goal);
            }
        }
        true
    }

    /// Stop the agent: drop its path and request, let go of doors.
    pub fn clear_path<D: DoorGate + ?Sized>(&mut self, agent: &mut MobileAgent, doors: &mut D) {
        self.movement.release_doors(agent, doors);
        agent.follow.clear_path();
        self.queue.cancel(agent.id);
    }

    fn same_goal(&self, a: WorldPos, b: WorldPos) -> bool {
        a.distance(b) <= self.queue_params.goal_tolerance
    }

    fn goal_drifted(&self, planned: WorldPos, target: WorldPos) -> bool {
        let a = self.grid.snap_to_tile_center(planned);
        let b = self.grid.snap_to_tile_center(target);
        a.distance(b) > self.movement.params().replan_distance
    }

    /// Advance `agent` toward `order.target` for one tick of `dt` seconds.
    pub fn move_along_path<D: DoorGate + ?Sized>(
        &mut self,
        agent: &mut MobileAgent,
        doors: &mut D,
        order: MoveOrder,
        dt: f32,
    ) -> MoveStatus {
        let target = order.target;
        if agent.position.distance(target) <= order.arrive_radius {
            self.clear_path(agent, doors);
            return MoveStatus::Arrived;
        }

        if let Some(failed) = agent.follow.failed_goal {
            if self.same_goal(failed, target) {
                return MoveStatus::Failed;
            }
            agent.follow.failed_goal = None;
        }

        let drifted = agent
            .follow
            .path_goal
            .is_some_and(|planned| self.goal_drifted(planned, target));
        if drifted && !self.queue_params.async_enabled {
            self.movement.release_unentered_doors(agent, doors);
            agent.follow.clear_path();
        }

        if !agent.follow.has_path() || drifted {
            if !agent.follow.has_path()
                && self.grid.tile_of(agent.position) == self.grid.tile_of(target)
            {
                return self.step_direct(agent, order, dt);
            }
            match self.plan(agent, doors, target, order.priority) {
                MoveStatus::Failed => return MoveStatus::Failed,
                MoveStatus::PathPending if !agent.follow.has_path() => {
                    return MoveStatus::PathPending;
                }
                _ => {}
            }
        }

        match self.movement.follow(&self.grid, agent, doors, dt) {
            FollowOutcome::NoPath => MoveStatus::PathPending,
            FollowOutcome::WaitingForDoor => MoveStatus::WaitingForDoor,
            FollowOutcome::Advancing | FollowOutcome::JitterSkip | FollowOutcome::PathComplete => {
                if agent.position.distance(target) <= order.arrive_radius {
                    self.clear_path(agent, doors);
                    MoveStatus::Arrived
                } else {
                    MoveStatus::Moving
                }
            }
            outcome @ (FollowOutcome::JitterReplan | FollowOutcome::Blocked) => {
                if outcome == FollowOutcome::JitterReplan {
                    self.counters.jitter_escapes += 1;
                    agent.follow.jitter_replans += 1;
                    if agent.follow.jitter_replans > self.movement.params().max_jitter_replans {
                        debug!(
                            "{} giving up on {} after {} jitter replans",
                            agent.id, target, agent.follow.jitter_replans
                        );
                        self.movement.release_unentered_doors(agent, doors);
                        agent.follow.clear_path();
                        agent.follow.failed_goal = Some(target);
                        return MoveStatus::Failed;
                    }
                }
                self.counters.replans += 1;
                debug!("{} replanning to {} after {:?}", agent.id, target, outcome);
                self.replan_now(agent, doors, target)
            }
        }
    }

    /// Walk straight at a target inside the agent's own tile.
    fn step_direct(&self, agent: &mut MobileAgent, order: MoveOrder, dt: f32) -> MoveStatus {
        let step = self.movement.speed_at(&self.grid, agent) * dt;
        let dist = agent.position.distance(order.target);
        if dist > self.movement.params().facing_min_distance {
            agent.facing = Facing::from_vector(
                order.target.x - agent.position.x,
                order.target.y - agent.position.y,
            );
        }
        agent.position = self.grid.clamp(agent.position.step_toward(order.target, step));
        if agent.position.distance(order.target) <= order.arrive_radius {
            MoveStatus::Arrived
        } else {
            MoveStatus::Moving
        }
    }

    /// Get a path toward `target` in place. Returns `Moving` when the agent
    /// has a path to follow, `PathPending` while waiting, `Failed` when no
    /// path exists.
    fn plan<D: DoorGate + ?Sized>(
        &mut self,
        agent: &mut MobileAgent,
        doors: &mut D,
        target: WorldPos,
        priority: PathPriority,
    ) -> MoveStatus {
        if !self.queue_params.async_enabled {
            return self.replan_now(agent, doors, target);
        }

        let req = PathRequest {
            agent: agent.id,
            start: agent.position,
            goal: target,
            priority,
        };
        match self.request_path_async(req) {
            RequestOutcome::CacheHit(path) => {
                self.movement.release_unentered_doors(agent, doors);
                agent.follow.set_path(path.nodes, target);
                MoveStatus::Moving
            }
            RequestOutcome::Queued { .. } | RequestOutcome::AlreadyPending { .. } => {
                let Some(job) = self.queue.issue_fallback(agent.id, self.clock_ms) else {
                    return MoveStatus::PathPending;
                };
                warn!(
                    "{} path request #{} timed out; computing synchronously",
                    agent.id, job.request_id
                );
                let path = self.compute_path(job.start, job.goal);
                let Some(resolution) = self.queue.complete(&job, path) else {
                    return MoveStatus::PathPending;
                };
                self.apply_resolution(agent, doors, resolution);
                if agent.follow.has_path() {
                    MoveStatus::Moving
                } else {
                    MoveStatus::Failed
                }
            }
        }
    }

    /// Synchronous replan from the agent's current position.
    fn replan_now<D: DoorGate + ?Sized>(
        &mut self,
        agent: &mut MobileAgent,
        doors: &mut D,
        target: WorldPos,
    ) -> MoveStatus {
        self.queue.cancel(agent.id);
        self.movement.release_unentered_doors(agent, doors);
        match self.compute_path(agent.position, target) {
            Some(path) => {
                agent.follow.set_path(path.nodes, target);
                MoveStatus::Moving
            }
            None => {
                agent.follow.clear_path();
                agent.follow.failed_goal = Some(target);
                MoveStatus::Failed
            }
        }
    }

    /// Best tile center from which `agent` at `from` can interact with
    /// `circle`. `None` if no candidate is reachable.
    pub fn best_approach_to_circle(
        &mut self,
        from: WorldPos,
        circle: &Circle,
        interact: f32,
    ) -> Option<ApproachPoint> {
        let now_secs = self.now_secs();
        let Self {
            grid,
            versions,
            cache,
            finder,
            counters,
            approach,
            ..
        } = self;
        let grid: &TerrainCostGrid = grid;
        let mut source = PathSource {
            grid,
            versions,
            cache,
            finder,
            counters,
            now_secs,
        };
        approach.resolve(grid, from, circle, interact, |a, b| source.path(a, b))
    }

    /// Age-based cache cleanup. Returns entries removed.
    pub fn clean_cache(&mut self) -> usize {
        let now_secs = self.now_secs();
        let removed = self.cache.clean(self.cache_params.max_age_secs, now_secs);
        if removed > 0 {
            debug!("path cache cleanup removed {} entries", removed);
        }
        removed
    }

    pub fn stats(&self) -> NavStats {
        NavStats {
            cache: self.cache.stats(),
            queue: self.queue.stats(),
            cache_entries: self.cache.len(),
            paths_computed: self.counters.paths_computed,
            no_path_results: self.counters.no_path_results,
            nodes_expanded: self.counters.nodes_expanded,
            jitter_escapes: self.counters.jitter_escapes,
            replans: self.counters.replans,
            queue_depth: self.queue.depth(),
            pending_requests: self.queue.pending_count(),
            region_versions: self.versions.version_dump(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::door::NoDoors;
    use crate::movement::MotionProfile;
    use crate::pathfinding::find_path;
    use crate::types::{AgentId, TerrainType, TileCoord};
    use crate::world::{BuildingKind, ResourceKind};

    const TS: f32 = 32.0;
    const DT: f32 = 0.05;

    fn center(x: i32, y: i32) -> WorldPos {
        WorldPos::new(x as f32 * TS + TS / 2.0, y as f32 * TS + TS / 2.0)
    }

    fn small_config(async_enabled: bool) -> GameConfig {
        let mut config = GameConfig::default();
        config.world_cols = 24;
        config.world_rows = 24;
        config.path_queue.async_enabled = async_enabled;
        config
    }

    fn setup(async_enabled: bool) -> (GameConfig, WorldState, Navigator) {
        let config = small_config(async_enabled);
        let world = WorldState::new(config.world_cols, config.world_rows, config.tile_size);
        let nav = Navigator::new(&config, &world).unwrap();
        (config, world, nav)
    }

    fn order(target: WorldPos) -> MoveOrder {
        MoveOrder {
            target,
            arrive_radius: 4.0,
            priority: PathPriority::Work,
        }
    }

    /// Drive one agent until it stops moving; returns the terminal status.
    fn drive(nav: &mut Navigator, agent: &mut MobileAgent, target: WorldPos) -> (MoveStatus, u64) {
        let mut clock = 0;
        for _ in 0..2000 {
            clock += 50;
            nav.set_clock(clock);
            let status = nav.move_along_path(agent, &mut NoDoors, order(target), DT);
            for resolution in nav.pump() {
                nav.apply_resolution(agent, &mut NoDoors, resolution);
            }
            if matches!(status, MoveStatus::Arrived | MoveStatus::Failed) {
                return (status, clock);
            }
        }
        panic!("agent never settled");
    }

    #[test]
    fn compute_path_fills_and_uses_cache() {
        let (_, _, mut nav) = setup(true);
        let a = nav.compute_path(center(1, 1), center(10, 4)).unwrap();
        let b = nav.compute_path(center(1, 1), center(10, 4)).unwrap();
        assert_eq!(a, b);
        let stats = nav.stats();
        assert_eq!(stats.paths_computed, 1);
        assert_eq!(stats.cache.hits, 1);
        assert!(stats.nodes_expanded >= 9);
        nav.compute_path(center(1, 1), center(10, 4)).unwrap();
        assert_eq!(nav.stats().nodes_expanded, stats.nodes_expanded);
    }

    #[test]
    fn partial_rebuild_invalidates_crossing_paths() {
        let (_, mut world, mut nav) = setup(true);
        nav.compute_path(center(1, 1), center(20, 1)).unwrap();
        assert_eq!(nav.cache().len(), 1);

        world.add_resource(ResourceKind::Rock, center(18, 1), 10.0);
        nav.rebuild_nav_grid_partial(&world, center(18, 1), 20.0).unwrap();
        assert!(nav.cache().is_empty());
        assert!(nav.grid().is_solid(TileCoord::new(18, 1)));

        let detour = nav.compute_path(center(1, 1), center(20, 1)).unwrap();
        assert!(!detour.tiles.contains(&TileCoord::new(18, 1)));
        assert_eq!(nav.stats().paths_computed, 2);
    }

    #[test]
    fn sync_mode_walks_to_target() {
        let (_, _, mut nav) = setup(false);
        let mut agent = MobileAgent::new(AgentId(0), center(2, 2), MotionProfile::default());
        let (status, _) = drive(&mut nav, &mut agent, center(9, 6));
        assert_eq!(status, MoveStatus::Arrived);
        assert!(agent.position.distance(center(9, 6)) <= 4.0);
    }

    #[test]
    fn async_mode_walks_to_target_through_the_queue() {
        let (_, _, mut nav) = setup(true);
        let mut agent = MobileAgent::new(AgentId(0), center(2, 2), MotionProfile::default());
        let first = nav.move_along_path(&mut agent, &mut NoDoors, order(center(12, 12)), DT);
        assert_eq!(first, MoveStatus::PathPending);
        assert_eq!(nav.queue().depth(), 1);
        let (status, _) = drive(&mut nav, &mut agent, center(12, 12));
        assert_eq!(status, MoveStatus::Arrived);
        assert_eq!(nav.stats().queue.enqueued, 1);
    }

    #[test]
    fn unreachable_goal_fails_once_without_retrying() {
        let (config, mut world, _) = setup(false);
        for y in 0..24 {
            world.add_building(BuildingKind::Wall, TileRect::new(12, y, 1, 1));
        }
        let mut nav = Navigator::new(&config, &world).unwrap();
        let mut agent = MobileAgent::new(AgentId(0), center(2, 2), MotionProfile::default());
        let (status, _) = drive(&mut nav, &mut agent, center(20, 2));
        assert_eq!(status, MoveStatus::Failed);
        let computed = nav.stats().paths_computed;
        for _ in 0..10 {
            assert_eq!(
                nav.move_along_path(&mut agent, &mut NoDoors, order(center(20, 2)), DT),
                MoveStatus::Failed
            );
        }
        assert_eq!(nav.stats().paths_computed, computed);
    }

    #[test]
    fn blocked_path_replans_around_new_obstacle() {
        let (_, mut world, mut nav) = setup(false);
        let mut agent = MobileAgent::new(AgentId(0), center(1, 5), MotionProfile::default());
        let target = center(15, 5);
        assert_eq!(
            nav.move_along_path(&mut agent, &mut NoDoors, order(target), DT),
            MoveStatus::Moving
        );
        world.add_building(BuildingKind::House, TileRect::new(8, 5, 1, 1));
        nav.rebuild_nav_grid_partial(&world, center(8, 5), 16.0).unwrap();

        let (status, _) = drive(&mut nav, &mut agent, target);
        assert_eq!(status, MoveStatus::Arrived);
        assert!(nav.stats().replans >= 1);
        assert!(!nav.grid().is_solid(nav.grid().tile_of(agent.position)));
    }

    #[test]
    fn slow_agent_on_mud_arrives_without_jitter_escapes() {
        let (config, mut world, _) = setup(false);
        world.set_terrain_rect(TileRect::new(0, 0, 24, 24), TerrainType::Mud);
        let mut nav = Navigator::new(&config, &world).unwrap();
        let slow = MotionProfile {
            base_speed: 60.0,
            fatigue_multiplier: 0.2,
            equipment_speed_multiplier: 0.5,
        };
        let mut agent = MobileAgent::new(AgentId(0), center(1, 1), slow);
        let (status, _) = drive(&mut nav, &mut agent, center(6, 1));
        assert_eq!(status, MoveStatus::Arrived);
        assert_eq!(nav.stats().jitter_escapes, 0);
        assert_eq!(nav.stats().replans, 0);
    }

    #[test]
    fn repeated_jitter_replans_give_up_on_the_goal() {
        let mut config = small_config(false);
        config.movement.max_node_time_secs = 0.0;
        config.movement.node_time_factor = 0.0;
        config.movement.max_jitter_replans = 2;
        let world = WorldState::new(config.world_cols, config.world_rows, config.tile_size);
        let mut nav = Navigator::new(&config, &world).unwrap();
        let mut agent = MobileAgent::new(AgentId(0), center(2, 2), MotionProfile::default());
        let target = center(12, 2);

        let (status, _) = drive(&mut nav, &mut agent, target);
        assert_eq!(status, MoveStatus::Failed);
        assert_eq!(nav.stats().jitter_escapes, 3);
        assert_eq!(agent.follow.failed_goal, Some(target));
        assert!(!agent.follow.has_path());
    }

    #[test]
    fn corner_pinched_in_a_neighboring_region_drops_cached_diagonal() {
        let mut config = small_config(false);
        config.world_cols = 32;
        config.world_rows = 32;
        let mut world = WorldState::new(32, 32, config.tile_size);
        world.add_building(BuildingKind::Wall, TileRect::new(16, 15, 1, 1));
        let mut nav = Navigator::new(&config, &world).unwrap();

        let diagonal = nav.compute_path(center(14, 14), center(17, 17)).unwrap();
        assert_eq!(
            diagonal.tiles,
            vec![
                TileCoord::new(14, 14),
                TileCoord::new(15, 15),
                TileCoord::new(16, 16),
                TileCoord::new(17, 17),
            ]
        );

        // (15, 16) sits in a region the cached path never enters.
        world.add_building(BuildingKind::Wall, TileRect::new(15, 16, 1, 1));
        nav.rebuild_nav_grid_partial(&world, center(15, 16), 10.0).unwrap();
        assert!(nav.cache().is_empty());

        let again = nav.compute_path(center(14, 14), center(17, 17)).unwrap();
        let fresh = find_path(nav.grid(), center(14, 14), center(17, 17)).unwrap();
        assert_eq!(again, fresh);
        assert!(
            !again
                .tiles
                .windows(2)
                .any(|w| w[0] == TileCoord::new(15, 15) && w[1] == TileCoord::new(16, 16))
        );
    }

    #[test]
    fn timed_out_request_gets_a_fallback() {
        let mut config = small_config(true);
        config.path_queue.budget_per_tick = 0;
        let world = WorldState::new(config.world_cols, config.world_rows, config.tile_size);
        let mut nav = Navigator::new(&config, &world).unwrap();
        let mut agent = MobileAgent::new(AgentId(3), center(2, 2), MotionProfile::default());
        let target = center(10, 10);

        nav.set_clock(0);
        assert_eq!(
            nav.move_along_path(&mut agent, &mut NoDoors, order(target), DT),
            MoveStatus::PathPending
        );
        nav.set_clock(400);
        assert_eq!(
            nav.move_along_path(&mut agent, &mut NoDoors, order(target), DT),
            MoveStatus::PathPending
        );
        nav.set_clock(800);
        assert_eq!(
            nav.move_along_path(&mut agent, &mut NoDoors, order(target), DT),
            MoveStatus::Moving
        );
        assert!(agent.follow.has_path());
        assert_eq!(nav.stats().queue.fallbacks, 1);
        assert_eq!(nav.queue().pending_count(), 0);
    }

    #[test]
    fn goal_drift_triggers_replan() {
        let (_, _, mut nav) = setup(false);
        let mut agent = MobileAgent::new(AgentId(0), center(2, 2), MotionProfile::default());
        nav.move_along_path(&mut agent, &mut NoDoors, order(center(12, 2)), DT);
        assert_eq!(agent.follow.path_goal, Some(center(12, 2)));
        // Within one tile: keep the path.
        nav.move_along_path(&mut agent, &mut NoDoors, order(center(12, 2).offset_polar(0.0, 5.0)), DT);
        assert_eq!(agent.follow.path_goal, Some(center(12, 2)));
        nav.move_along_path(&mut agent, &mut NoDoors, order(center(12, 12)), DT);
        assert_eq!(agent.follow.path_goal, Some(center(12, 12)));
    }

    #[test]
    fn approach_point_for_tree() {
        let (_, mut world, mut nav) = setup(true);
        let tree = center(10, 10);
        world.add_resource(ResourceKind::Tree, tree, 14.0);
        nav.rebuild_nav_grid(&world).unwrap();
        let point = nav
            .best_approach_to_circle(center(2, 10), &Circle { center: tree, radius: 14.0 }, 12.0)
            .unwrap();
        assert_eq!(point.pos, center(9, 10));
        assert!(!nav.grid().is_solid(nav.grid().tile_of(point.pos)));
    }

    #[test]
    fn clean_cache_ages_entries_out() {
        let (config, _, mut nav) = setup(true);
        nav.compute_path(center(1, 1), center(5, 5)).unwrap();
        let late = ((config.path_cache.max_age_secs + 1.0) * 1000.0) as u64;
        nav.set_clock(late);
        assert_eq!(nav.clean_cache(), 1);
        assert_eq!(nav.stats().cache.age_evictions, 1);
    }
}
