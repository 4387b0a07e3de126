// Tile cost grid: the navigation model the path finder searches.
//
// Two flat arrays indexed by `x + y * cols` hold, per tile, whether it is
// solid (impassable) and its movement-cost multiplier. Out-of-bounds tiles
// read as solid, so neighbor expansion at the map edge needs no special
// casing.
//
// `min_cost` tracks the cheapest cost currently on the grid and scales the
// A* heuristic. `set_tile` only ever lowers it; every rebuild, full or
// partial, ends with `recompute_min_cost`, so identical world state always
// yields the same heuristic and therefore the same paths.
//
// See also: `nav_builder.rs` which writes the grid from world state,
// `pathfinding.rs` and `approach.rs` which read it, `navigator.rs` which
// owns it.
//
// **Critical constraint: determinism.** The grid is plain data. No interior
// mutability, no hashing.

use crate::error::NavError;
use crate::types::{TileCoord, TileRect, WorldPos};

#[derive(Clone, Debug)]
pub struct TerrainCostGrid {
    pub cols: u32,
    pub rows: u32,
    pub tile_size: f32,
    solid: Vec<bool>,
    cost: Vec<f32>,
    min_cost: f32,
}

impl TerrainCostGrid {
    /// An all-open grid with every cost at 1.0.
    pub fn new(cols: u32, rows: u32, tile_size: f32) -> Self {
        let n = cols as usize * rows as usize;
        Self {
            cols,
            rows,
            tile_size,
            solid: vec![false; n],
            cost: vec![1.0; n],
            min_cost: 1.0,
        }
    }

    /// Build a grid from pre-filled arrays. Fails if the arrays don't match
    /// the dimensions or any cost is non-positive.
    pub fn from_arrays(
        cols: u32,
        rows: u32,
        tile_size: f32,
        solid: Vec<bool>,
        cost: Vec<f32>,
    ) -> Result<Self, NavError> {
        let mut grid = Self {
            cols,
            rows,
            tile_size,
            solid,
            cost,
            min_cost: 1.0,
        };
        grid.validate()?;
        grid.recompute_min_cost();
        Ok(grid)
    }

    pub fn tile_count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    pub fn bounds(&self) -> TileRect {
        TileRect::new(0, 0, self.cols as i32, self.rows as i32)
    }

    pub fn in_bounds(&self, tile: TileCoord) -> bool {
        tile.x >= 0 && tile.y >= 0 && (tile.x as u32) < self.cols && (tile.y as u32) < self.rows
    }

    /// Flat index of an in-bounds tile.
    pub fn index(&self, tile: TileCoord) -> Option<usize> {
        if self.in_bounds(tile) {
            Some(tile.x as usize + tile.y as usize * self.cols as usize)
        } else {
            None
        }
    }

    /// Inverse of `index`.
    pub fn coord_of(&self, index: usize) -> TileCoord {
        let cols = self.cols as usize;
        TileCoord::new((index % cols) as i32, (index / cols) as i32)
    }

    /// Containing tile of a world point (floor division).
    pub fn tile_of(&self, pos: WorldPos) -> TileCoord {
        TileCoord::new(
            (pos.x / self.tile_size).floor() as i32,
            (pos.y / self.tile_size).floor() as i32,
        )
    }

    /// Exact world-space center of a tile.
    pub fn tile_center(&self, tile: TileCoord) -> WorldPos {
        let half = self.tile_size / 2.0;
        WorldPos::new(
            tile.x as f32 * self.tile_size + half,
            tile.y as f32 * self.tile_size + half,
        )
    }

    pub fn snap_to_tile_center(&self, pos: WorldPos) -> WorldPos {
        self.tile_center(self.tile_of(pos))
    }

    /// Out-of-bounds tiles are solid.
    pub fn is_solid(&self, tile: TileCoord) -> bool {
        self.index(tile).is_none_or(|i| self.solid[i])
    }

    /// Cost multiplier of a tile; 1.0 outside the grid.
    pub fn cost_at(&self, tile: TileCoord) -> f32 {
        self.index(tile).map_or(1.0, |i| self.cost[i])
    }

    /// Cost of the tile under a world point.
    pub fn cost_at_pos(&self, pos: WorldPos) -> f32 {
        self.cost_at(self.tile_of(pos))
    }

    pub fn min_cost(&self) -> f32 {
        self.min_cost
    }

    /// Overwrite one tile. Out-of-bounds writes are no-ops.
    pub fn set_tile(&mut self, tile: TileCoord, solid: bool, cost: f32) -> Result<(), NavError> {
        if !(cost > 0.0) {
            return Err(NavError::NonPositiveCost {
                x: tile.x,
                y: tile.y,
                cost,
            });
        }
        if let Some(i) = self.index(tile) {
            self.solid[i] = solid;
            self.cost[i] = cost;
            if cost < self.min_cost {
                self.min_cost = cost;
            }
        }
        Ok(())
    }

    pub fn recompute_min_cost(&mut self) {
        self.min_cost = self.cost.iter().copied().fold(f32::INFINITY, f32::min);
        if !self.min_cost.is_finite() {
            self.min_cost = 1.0;
        }
    }

    /// Check the array/dimension and positive-cost invariants.
    pub fn validate(&self) -> Result<(), NavError> {
        let n = self.tile_count();
        if self.solid.len() != n || self.cost.len() != n {
            return Err(NavError::GridDimensionMismatch {
                cols: self.cols,
                rows: self.rows,
                solid_len: self.solid.len(),
                cost_len: self.cost.len(),
            });
        }
        if let Some(i) = self.cost.iter().position(|&c| !(c > 0.0)) {
            let tile = self.coord_of(i);
            return Err(NavError::NonPositiveCost {
                x: tile.x,
                y: tile.y,
                cost: self.cost[i],
            });
        }
        Ok(())
    }

    /// World extent in world units.
    pub fn world_width(&self) -> f32 {
        self.cols as f32 * self.tile_size
    }

    pub fn world_height(&self) -> f32 {
        self.rows as f32 * self.tile_size
    }

    /// Clamp a point into the world rectangle. The far edges are exclusive:
    /// the result always lies in an in-bounds tile.
    pub fn clamp(&self, pos: WorldPos) -> WorldPos {
        WorldPos::new(
            clamp_axis(pos.x, self.cols, self.tile_size),
            clamp_axis(pos.y, self.rows, self.tile_size),
        )
    }

    /// Number of solid tiles (diagnostics).
    pub fn solid_count(&self) -> usize {
        self.solid.iter().filter(|&&s| s).count()
    }
}

/// Clamp one coordinate into `[0, cells * tile_size)`, stepping down one
/// ulp at a time while float division still lands it past the last cell.
fn clamp_axis(v: f32, cells: u32, tile_size: f32) -> f32 {
    let mut v = v.clamp(0.0, cells as f32 * tile_size);
    while v > 0.0 && (v / tile_size).floor() >= cells as f32 {
        v = f32::from_bits(v.to_bits() - 1);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_centers_are_half_tile_offsets() {
        let grid = TerrainCostGrid::new(10, 10, 32.0);
        assert_eq!(grid.tile_center(TileCoord::new(0, 0)), WorldPos::new(16.0, 16.0));
        assert_eq!(grid.tile_center(TileCoord::new(3, 2)), WorldPos::new(112.0, 80.0));
        assert_eq!(grid.tile_of(WorldPos::new(63.9, 64.0)), TileCoord::new(1, 2));
        assert_eq!(grid.tile_of(WorldPos::new(-0.5, 5.0)), TileCoord::new(-1, 0));
    }

    #[test]
    fn out_of_bounds_is_solid() {
        let grid = TerrainCostGrid::new(4, 4, 32.0);
        assert!(grid.is_solid(TileCoord::new(-1, 0)));
        assert!(grid.is_solid(TileCoord::new(4, 0)));
        assert!(!grid.is_solid(TileCoord::new(3, 3)));
    }

    #[test]
    fn set_tile_rejects_non_positive_cost() {
        let mut grid = TerrainCostGrid::new(4, 4, 32.0);
        let err = grid.set_tile(TileCoord::new(1, 1), false, 0.0);
        assert!(matches!(err, Err(NavError::NonPositiveCost { x: 1, y: 1, .. })));
        let err = grid.set_tile(TileCoord::new(1, 1), false, -2.0);
        assert!(err.is_err());
    }

    #[test]
    fn min_cost_follows_cheapest_tile() {
        let mut grid = TerrainCostGrid::new(4, 4, 32.0);
        grid.set_tile(TileCoord::new(0, 0), false, 0.5).unwrap();
        assert_eq!(grid.min_cost(), 0.5);
        grid.set_tile(TileCoord::new(0, 0), false, 1.0).unwrap();
        // Only lowered incrementally.
        assert_eq!(grid.min_cost(), 0.5);
        grid.recompute_min_cost();
        assert_eq!(grid.min_cost(), 1.0);
    }

    #[test]
    fn from_arrays_detects_dimension_mismatch() {
        let result = TerrainCostGrid::from_arrays(3, 3, 32.0, vec![false; 9], vec![1.0; 8]);
        assert!(matches!(
            result,
            Err(NavError::GridDimensionMismatch { cost_len: 8, .. })
        ));
    }

    #[test]
    fn clamp_keeps_points_inside_world() {
        let grid = TerrainCostGrid::new(4, 2, 32.0);
        let clamped = grid.clamp(WorldPos::new(-5.0, 100.0));
        assert_eq!(clamped.x, 0.0);
        assert!(clamped.y < 64.0 && clamped.y > 63.9);
        assert_eq!(grid.tile_of(clamped), TileCoord::new(0, 1));
    }

    #[test]
    fn clamp_at_far_edge_stays_in_last_tile() {
        let grid = TerrainCostGrid::new(4, 2, 32.0);
        let edge = grid.clamp(WorldPos::new(grid.world_width(), grid.world_height()));
        assert_eq!(grid.tile_of(edge), TileCoord::new(3, 1));
        assert!(grid.index(grid.tile_of(edge)).is_some());

        let wide = TerrainCostGrid::new(4096, 4096, 32.0);
        let edge = wide.clamp(WorldPos::new(1.0e9, wide.world_height()));
        assert_eq!(wide.tile_of(edge), TileCoord::new(4095, 4095));
    }
}
