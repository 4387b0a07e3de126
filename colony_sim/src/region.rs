// Region version counters for cache invalidation.
//
// The map is partitioned into fixed square chunks of `region_size` tiles
// (the last row/column of chunks may be smaller). Each region carries a
// `u64` version that starts at 0 and only ever increases: every structural
// change inside the region bumps it by exactly one, and repeated bumps in
// one tick simply advance it further.
//
// A `RegionSnapshot` records the versions of the regions a path crosses at
// compute time. It is valid iff every recorded version still matches. The
// snapshot also carries the layout `epoch`; `reset_layout` (a resize)
// bumps the epoch so snapshots of the old partition fail closed instead of
// being compared against unrelated regions. An id the manager doesn't know
// also fails closed.
//
// See also: `path_cache.rs` which stores snapshots alongside paths,
// `navigator.rs` which marks regions changed after each rebuild.
//
// **Critical constraint: determinism.** Region ids are row-major chunk
// indices; the dirty set is a `BTreeSet`.

use crate::types::{RegionId, TileCoord, TileRect};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Immutable capture of region versions. Most paths cross a handful of
/// regions, so entries stay inline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub epoch: u64,
    pub entries: SmallVec<[(RegionId, u64); 8]>,
}

impl RegionSnapshot {
    pub fn covers(&self, region: RegionId) -> bool {
        self.entries.iter().any(|&(id, _)| id == region)
    }
}

#[derive(Clone, Debug)]
pub struct RegionVersionManager {
    region_size: u32,
    cols: u32,
    rows: u32,
    regions_x: u32,
    versions: Vec<u64>,
    dirty: BTreeSet<RegionId>,
    epoch: u64,
}

impl RegionVersionManager {
    pub fn new(cols: u32, rows: u32, region_size: u32) -> Self {
        let region_size = region_size.max(1);
        let regions_x = cols.div_ceil(region_size);
        let regions_y = rows.div_ceil(region_size);
        Self {
            region_size,
            cols,
            rows,
            regions_x,
            versions: vec![0; regions_x as usize * regions_y as usize],
            dirty: BTreeSet::new(),
            epoch: 0,
        }
    }

    pub fn region_count(&self) -> usize {
        self.versions.len()
    }

    /// Region containing a tile, clamped onto the map.
    pub fn region_of(&self, tile: TileCoord) -> RegionId {
        let max_x = self.cols.saturating_sub(1) as i32;
        let max_y = self.rows.saturating_sub(1) as i32;
        let rx = tile.x.clamp(0, max_x) as u32 / self.region_size;
        let ry = tile.y.clamp(0, max_y) as u32 / self.region_size;
        RegionId(ry * self.regions_x + rx)
    }

    /// Regions overlapping a tile rectangle, in ascending id order.
    pub fn regions_in_rect(&self, rect: TileRect) -> Vec<RegionId> {
        let clipped = rect.intersect(&TileRect::new(0, 0, self.cols as i32, self.rows as i32));
        if clipped.is_empty() {
            return Vec::new();
        }
        let size = self.region_size as i32;
        let rx0 = clipped.x / size;
        let ry0 = clipped.y / size;
        let rx1 = (clipped.x + clipped.width - 1) / size;
        let ry1 = (clipped.y + clipped.height - 1) / size;
        let mut out = Vec::with_capacity(((rx1 - rx0 + 1) * (ry1 - ry0 + 1)) as usize);
        for ry in ry0..=ry1 {
            for rx in rx0..=rx1 {
                out.push(RegionId(ry as u32 * self.regions_x + rx as u32));
            }
        }
        out
    }

    /// Distinct regions crossed by a tile sequence, in first-visit order.
    pub fn regions_for_tiles(&self, tiles: &[TileCoord]) -> SmallVec<[RegionId; 8]> {
        let mut out: SmallVec<[RegionId; 8]> = SmallVec::new();
        for &tile in tiles {
            let region = self.region_of(tile);
            if !out.contains(&region) {
                out.push(region);
            }
        }
        out
    }

    pub fn version(&self, region: RegionId) -> Option<u64> {
        self.versions.get(region.0 as usize).copied()
    }

    /// Bump a region's version by one. Unknown ids are ignored.
    pub fn mark_region_changed(&mut self, region: RegionId) {
        if let Some(v) = self.versions.get_mut(region.0 as usize) {
            *v += 1;
            self.dirty.insert(region);
        }
    }

    /// Bump every region overlapping `rect`; returns the regions bumped.
    pub fn mark_rect_changed(&mut self, rect: TileRect) -> Vec<RegionId> {
        let regions = self.regions_in_rect(rect);
        for &region in &regions {
            self.mark_region_changed(region);
        }
        regions
    }

    pub fn create_snapshot(&self, regions: &[RegionId]) -> RegionSnapshot {
        RegionSnapshot {
            epoch: self.epoch,
            entries: regions
                .iter()
                .filter_map(|&id| self.version(id).map(|v| (id, v)))
                .collect(),
        }
    }

    /// Snapshot of the regions a tile path crosses.
    pub fn snapshot_for_tiles(&self, tiles: &[TileCoord]) -> RegionSnapshot {
        self.create_snapshot(&self.regions_for_tiles(tiles))
    }

    /// True iff the snapshot's epoch and every recorded version are current.
    pub fn validate_snapshot(&self, snapshot: &RegionSnapshot) -> bool {
        snapshot.epoch == self.epoch
            && snapshot
                .entries
                .iter()
                .all(|&(id, v)| self.version(id) == Some(v))
    }

    /// Regions changed since the last `clear_dirty_regions`.
    pub fn dirty_regions(&self) -> &BTreeSet<RegionId> {
        &self.dirty
    }

    pub fn clear_dirty_regions(&mut self) {
        self.dirty.clear();
    }

    /// Repartition for new map dimensions. Invalidates every snapshot taken
    /// under the previous layout.
    pub fn reset_layout(&mut self, cols: u32, rows: u32) {
        let epoch = self.epoch + 1;
        *self = Self::new(cols, rows, self.region_size);
        self.epoch = epoch;
    }

    /// `(region, version)` for every region, for introspection.
    pub fn version_dump(&self) -> Vec<(RegionId, u64)> {
        self.versions
            .iter()
            .enumerate()
            .map(|(i, &v)| (RegionId(i as u32), v))
            .collect()
    }
}
