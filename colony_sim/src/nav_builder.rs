// Nav grid construction from world state.
//
// `NavGridBuilder` interprets the `WorldState` registry through the terrain
// table and writes solidity and cost into a `TerrainCostGrid`. Stamping is
// layered, later layers winning:
//
// 1. Terrain: cost and solidity from `GameConfig::terrain`.
// 2. Resource nodes: covered tiles become solid (cost untouched).
// 3. Buildings: doors force their footprint passable at `door_cost`;
//    movement-blocking buildings make their footprint solid; walk-through
//    buildings leave the tile as the lower layers made it.
//
// Full and partial rebuilds run the same `stamp` routine, the partial one
// restricted to tiles whose center lies within the radius (plus the tile
// under the center). Identical input state therefore always produces
// identical tiles under both modes.
//
// The builder never touches region versions. The caller (`navigator.rs`)
// marks the returned rectangle's regions changed after a rebuild.
//
// See also: `world.rs` for the registry being read, `grid.rs` for the
// target, `navigator.rs` which owns a builder and drives rebuilds.
//
// **Critical constraint: determinism.** Layers are stamped in id order from
// `BTreeMap`s; the result depends only on world state and config.

use crate::config::{GameConfig, TerrainProps};
use crate::error::NavError;
use crate::grid::TerrainCostGrid;
use crate::types::{TerrainType, TileCoord, TileRect, WorldPos};
use crate::world::{BuildingKind, WorldState};
use log::debug;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct NavGridBuilder {
    terrain: BTreeMap<TerrainType, TerrainProps>,
    door_cost: f32,
}

impl NavGridBuilder {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            terrain: config.terrain.clone(),
            door_cost: config.door_cost,
        }
    }

    fn terrain_props(&self, terrain: TerrainType) -> TerrainProps {
        self.terrain.get(&terrain).copied().unwrap_or(TerrainProps {
            cost: 1.0,
            solid: false,
        })
    }

    /// Recompute every tile. Returns the full grid rectangle.
    pub fn rebuild_full(
        &self,
        world: &WorldState,
        grid: &mut TerrainCostGrid,
    ) -> Result<TileRect, NavError> {
        check_dimensions(world, grid)?;
        let area = grid.bounds();
        let stamped = self.stamp(world, grid, area, |_| true)?;
        grid.recompute_min_cost();
        debug!(
            "nav grid full rebuild: {} tiles, {} solid, min cost {}",
            stamped,
            grid.solid_count(),
            grid.min_cost()
        );
        Ok(area)
    }

    /// Recompute only the tiles whose center lies within `radius` of
    /// `center`, plus the tile under `center`. Returns the bounding
    /// rectangle of the recomputed tiles (empty if nothing was in bounds).
    pub fn rebuild_partial(
        &self,
        world: &WorldState,
        grid: &mut TerrainCostGrid,
        center: WorldPos,
        radius: f32,
    ) -> Result<TileRect, NavError> {
        check_dimensions(world, grid)?;
        let radius = radius.max(0.0);
        let tile_size = grid.tile_size;
        let center_tile = grid.tile_of(center);
        let x0 = ((center.x - radius) / tile_size).floor() as i32;
        let y0 = ((center.y - radius) / tile_size).floor() as i32;
        let x1 = ((center.x + radius) / tile_size).floor() as i32;
        let y1 = ((center.y + radius) / tile_size).floor() as i32;
        let area = TileRect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1).intersect(&grid.bounds());

        let radius_sq = radius * radius;
        let half = tile_size / 2.0;
        let include = |tile: TileCoord| {
            if tile == center_tile {
                return true;
            }
            let c = WorldPos::new(
                tile.x as f32 * tile_size + half,
                tile.y as f32 * tile_size + half,
            );
            c.distance_sq(center) <= radius_sq
        };
        let stamped = self.stamp(world, grid, area, include)?;
        if stamped > 0 {
            grid.recompute_min_cost();
        }
        debug!(
            "nav grid partial rebuild at {} r={}: {} tiles in {:?}",
            center, radius, stamped, area
        );
        if stamped == 0 {
            return Ok(TileRect::new(area.x, area.y, 0, 0));
        }
        Ok(area)
    }

    /// Layered stamp over `area`, restricted to tiles passing `include`.
    /// Returns the number of tiles written.
    fn stamp(
        &self,
        world: &WorldState,
        grid: &mut TerrainCostGrid,
        area: TileRect,
        include: impl Fn(TileCoord) -> bool,
    ) -> Result<usize, NavError> {
        if area.is_empty() {
            return Ok(0);
        }
        let width = area.width as usize;
        let local = |tile: TileCoord| (tile.x - area.x) as usize + (tile.y - area.y) as usize * width;

        // Layer 1: terrain.
        let mut scratch: Vec<Option<(bool, f32)>> = area
            .tiles()
            .map(|tile| {
                include(tile).then(|| {
                    let props = self.terrain_props(world.terrain_at(tile));
                    (props.solid, props.cost)
                })
            })
            .collect();

        // Layer 2: resource nodes.
        for node in world.resources.values() {
            let overlap = node.tile_bounds(world.tile_size).intersect(&area);
            for tile in overlap.tiles() {
                if let Some(cell) = scratch[local(tile)].as_mut()
                    && node.covers_tile(tile, world.tile_size)
                {
                    cell.0 = true;
                }
            }
        }

        // Layer 3: buildings.
        for building in world.buildings.values() {
            let overlap = building.footprint.intersect(&area);
            for tile in overlap.tiles() {
                let Some(cell) = scratch[local(tile)].as_mut() else {
                    continue;
                };
                if building.kind == BuildingKind::Door {
                    *cell = (false, self.door_cost);
                } else if building.blocks_movement {
                    cell.0 = true;
                }
            }
        }

        let mut written = 0;
        for (tile, cell) in area.tiles().zip(scratch) {
            if let Some((solid, cost)) = cell {
                grid.set_tile(tile, solid, cost)?;
                written += 1;
            }
        }
        Ok(written)
    }
}

fn check_dimensions(world: &WorldState, grid: &TerrainCostGrid) -> Result<(), NavError> {
    if world.cols != grid.cols || world.rows != grid.rows {
        return Err(NavError::WorldGridMismatch {
            world_cols: world.cols,
            world_rows: world.rows,
            grid_cols: grid.cols,
            grid_rows: grid.rows,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ResourceKind;

    fn setup() -> (GameConfig, WorldState, TerrainCostGrid) {
        let config = GameConfig::default();
        let world = WorldState::new(16, 16, 32.0);
        let grid = TerrainCostGrid::new(16, 16, 32.0);
        (config, world, grid)
    }

    fn snapshot(grid: &TerrainCostGrid) -> Vec<(bool, f32)> {
        grid.bounds()
            .tiles()
            .map(|t| (grid.is_solid(t), grid.cost_at(t)))
            .collect()
    }

    #[test]
    fn full_rebuild_applies_terrain_table() {
        let (config, mut world, mut grid) = setup();
        world.set_terrain_rect(TileRect::new(0, 0, 3, 1), TerrainType::Road);
        world.set_terrain_rect(TileRect::new(0, 1, 1, 1), TerrainType::Mountain);
        world.set_terrain_rect(TileRect::new(1, 1, 1, 1), TerrainType::Mud);
        let builder = NavGridBuilder::new(&config);
        builder.rebuild_full(&world, &mut grid).unwrap();

        assert_eq!(grid.cost_at(TileCoord::new(2, 0)), 0.5);
        assert!(grid.is_solid(TileCoord::new(0, 1)));
        assert_eq!(grid.cost_at(TileCoord::new(1, 1)), 1.8);
        assert_eq!(grid.min_cost(), 0.5);
    }

    #[test]
    fn doors_override_blocking_buildings() {
        let (config, mut world, mut grid) = setup();
        world.add_building(BuildingKind::Wall, TileRect::new(2, 2, 5, 1));
        world.add_building(BuildingKind::Door, TileRect::new(4, 2, 1, 1));
        world.add_building(BuildingKind::Farm, TileRect::new(8, 8, 2, 2));
        NavGridBuilder::new(&config).rebuild_full(&world, &mut grid).unwrap();

        assert!(grid.is_solid(TileCoord::new(3, 2)));
        assert!(!grid.is_solid(TileCoord::new(4, 2)));
        assert_eq!(grid.cost_at(TileCoord::new(4, 2)), config.door_cost);
        assert!(!grid.is_solid(TileCoord::new(8, 8)));
    }

    #[test]
    fn partial_matches_full_after_resource_removal() {
        let (config, mut world, mut grid) = setup();
        world.set_terrain_rect(TileRect::new(3, 3, 6, 6), TerrainType::Mud);
        let tree = world.add_resource(ResourceKind::Tree, WorldPos::new(160.0, 160.0), 30.0);
        world.add_resource(ResourceKind::Rock, WorldPos::new(200.0, 170.0), 10.0);
        world.add_building(BuildingKind::House, TileRect::new(6, 4, 2, 2));
        let builder = NavGridBuilder::new(&config);
        builder.rebuild_full(&world, &mut grid).unwrap();
        assert!(grid.is_solid(TileCoord::new(5, 5)));

        world.remove_resource(tree);
        let touched = builder
            .rebuild_partial(&world, &mut grid, WorldPos::new(160.0, 160.0), 64.0)
            .unwrap();
        assert!(!touched.is_empty());
        assert!(!grid.is_solid(TileCoord::new(5, 5)));

        let mut reference = TerrainCostGrid::new(16, 16, 32.0);
        builder.rebuild_full(&world, &mut reference).unwrap();
        assert_eq!(snapshot(&grid), snapshot(&reference));
    }

    #[test]
    fn partial_rebuild_raises_min_cost_when_road_is_removed() {
        let (config, mut world, mut grid) = setup();
        world.set_terrain_rect(TileRect::new(4, 4, 2, 1), TerrainType::Road);
        let builder = NavGridBuilder::new(&config);
        builder.rebuild_full(&world, &mut grid).unwrap();
        assert_eq!(grid.min_cost(), 0.5);

        world.set_terrain_rect(TileRect::new(4, 4, 2, 1), TerrainType::Grass);
        builder
            .rebuild_partial(&world, &mut grid, WorldPos::new(160.0, 144.0), 64.0)
            .unwrap();
        let mut reference = TerrainCostGrid::new(16, 16, 32.0);
        builder.rebuild_full(&world, &mut reference).unwrap();
        assert_eq!(grid.min_cost(), reference.min_cost());
        assert_eq!(grid.min_cost(), 1.0);
    }

    #[test]
    fn partial_rebuild_leaves_far_tiles_alone() {
        let (config, world, mut grid) = setup();
        grid.set_tile(TileCoord::new(15, 15), true, 3.0).unwrap();
        NavGridBuilder::new(&config)
            .rebuild_partial(&world, &mut grid, WorldPos::new(16.0, 16.0), 40.0)
            .unwrap();
        assert!(grid.is_solid(TileCoord::new(15, 15)));
    }

    #[test]
    fn partial_rebuild_off_map_touches_nothing() {
        let (config, world, mut grid) = setup();
        let touched = NavGridBuilder::new(&config)
            .rebuild_partial(&world, &mut grid, WorldPos::new(-500.0, -500.0), 10.0)
            .unwrap();
        assert!(touched.is_empty());
    }

    #[test]
    fn dimension_mismatch_is_a_hard_fault() {
        let (config, world, _) = setup();
        let mut grid = TerrainCostGrid::new(8, 16, 32.0);
        let result = NavGridBuilder::new(&config).rebuild_full(&world, &mut grid);
        assert!(matches!(result, Err(NavError::WorldGridMismatch { grid_cols: 8, .. })));
    }
}
