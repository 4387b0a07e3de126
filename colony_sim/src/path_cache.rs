// Region-version-tagged path cache.
//
// Paths are keyed by (start tile, goal tile): two requests landing in the
// same tiles share an entry. Each entry stores the region snapshot taken
// when the path was computed; `check` re-validates it against the live
// `RegionVersionManager` on every read and evicts on mismatch, so a path
// crossing changed geometry is never served. `invalidate_for_regions` is
// the proactive counterpart, used after rebuilds to keep the map small.
// `clean` drops entries by age regardless of validity.
//
// The backing map is an `FxHashMap`; nothing iterates it in an
// order-sensitive way (only `retain`), so hashing doesn't leak into
// simulation results.
//
// See also: `region.rs` for snapshots, `navigator.rs` and `path_queue.rs`
// which consult and fill the cache.

use crate::grid::TerrainCostGrid;
use crate::pathfinding::PathResult;
use crate::region::{RegionSnapshot, RegionVersionManager};
use crate::types::{RegionId, TileCoord, WorldPos};
use log::trace;
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub start: TileCoord,
    pub goal: TileCoord,
}

impl CacheKey {
    pub fn new(start: TileCoord, goal: TileCoord) -> Self {
        Self { start, goal }
    }

    /// Key for world-space endpoints, rounded to tiles.
    pub fn from_world(grid: &TerrainCostGrid, start: WorldPos, goal: WorldPos) -> Self {
        Self::new(grid.tile_of(start), grid.tile_of(goal))
    }
}

#[derive(Clone, Debug)]
pub struct PathCacheEntry {
    pub path: PathResult,
    pub snapshot: RegionSnapshot,
    /// Sim-clock seconds at store time.
    pub timestamp: f64,
    pub hit_count: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped on read because their snapshot was stale.
    pub stale_evictions: u64,
    /// Entries dropped by `invalidate_for_regions`.
    pub invalidations: u64,
    /// Entries dropped by `clean`.
    pub age_evictions: u64,
}

#[derive(Debug, Default)]
pub struct PathCache {
    entries: FxHashMap<CacheKey, PathCacheEntry>,
    stats: CacheStats,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached path for `key` if its snapshot is still valid. A stale entry
    /// is evicted and reported as a miss.
    pub fn check(&mut self, key: CacheKey, versions: &RegionVersionManager) -> Option<PathResult> {
        let Some(entry) = self.entries.get_mut(&key) else {
            self.stats.misses += 1;
            return None;
        };
        if !versions.validate_snapshot(&entry.snapshot) {
            self.entries.remove(&key);
            self.stats.stale_evictions += 1;
            self.stats.misses += 1;
            trace!("path cache stale {:?} -> {:?}", key.start, key.goal);
            return None;
        }
        entry.hit_count += 1;
        self.stats.hits += 1;
        trace!(
            "path cache hit {:?} -> {:?} ({} hits)",
            key.start, key.goal, entry.hit_count
        );
        Some(entry.path.clone())
    }

    /// Insert or overwrite the entry for `key`.
    pub fn store(&mut self, key: CacheKey, path: PathResult, snapshot: RegionSnapshot, now_secs: f64) {
        self.entries.insert(
            key,
            PathCacheEntry {
                path,
                snapshot,
                timestamp: now_secs,
                hit_count: 0,
            },
        );
    }

    /// Drop every entry whose snapshot covers any of `regions`. Returns the
    /// number removed.
    pub fn invalidate_for_regions(&mut self, regions: &[RegionId]) -> usize {
        if regions.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !regions.iter().any(|&r| entry.snapshot.covers(r)));
        let removed = before - self.entries.len();
        self.stats.invalidations += removed as u64;
        removed
    }

    /// Drop entries older than `max_age_secs`. Returns the number removed.
    pub fn clean(&mut self, max_age_secs: f64, now_secs: f64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now_secs - entry.timestamp <= max_age_secs);
        let removed = before - self.entries.len();
        self.stats.age_evictions += removed as u64;
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
