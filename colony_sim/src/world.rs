// World registry: terrain, buildings and resource nodes.
//
// This is the structural truth the nav grid is derived from. It knows
// nothing about costs or solidity. `nav_builder.rs` interprets it through
// the terrain table in `GameConfig`.
//
// Terrain is a flat `Vec<TerrainType>` indexed like the nav grid. Buildings
// are axis-aligned tile rectangles; resource nodes (trees, rocks) are
// circles in world space. Both live in `BTreeMap`s keyed by sequential ids.
//
// Terrain repaints return the clipped rectangle they changed; buildings
// carry their footprint and resources their `tile_bounds`, so the caller can
// pick between a partial and a full nav-grid rebuild.
//
// See also: `nav_builder.rs` which stamps this registry into a
// `TerrainCostGrid`, `sim.rs` which owns the `WorldState` and applies
// structural commands to it.
//
// **Critical constraint: determinism.** Ids are handed out sequentially and
// all collections iterate in key order.

use crate::types::{BuildingId, ResourceId, TerrainType, TileCoord, TileRect, WorldPos};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildingKind {
    House,
    Storage,
    Wall,
    /// Passable chokepoint arbitrated by `DoorQueues`.
    Door,
    /// Walk-through footprint (fields, stockpile zones).
    Farm,
}

impl BuildingKind {
    /// Whether a freshly placed building of this kind obstructs movement.
    pub fn default_blocks_movement(self) -> bool {
        matches!(self, BuildingKind::House | BuildingKind::Storage | BuildingKind::Wall)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    pub kind: BuildingKind,
    pub footprint: TileRect,
    pub blocks_movement: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Tree,
    Rock,
}

/// A circular harvestable obstacle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub center: WorldPos,
    pub radius: f32,
}

impl ResourceNode {
    /// Whether this node makes `tile` solid: the tile center lies inside the
    /// circle, or the tile contains the circle's center.
    pub fn covers_tile(&self, tile: TileCoord, tile_size: f32) -> bool {
        let half = tile_size / 2.0;
        let center = WorldPos::new(
            tile.x as f32 * tile_size + half,
            tile.y as f32 * tile_size + half,
        );
        if center.distance_sq(self.center) < self.radius * self.radius {
            return true;
        }
        let own_tile = TileCoord::new(
            (self.center.x / tile_size).floor() as i32,
            (self.center.y / tile_size).floor() as i32,
        );
        own_tile == tile
    }

    /// Tiles that could possibly be covered (circle bounding box).
    pub fn tile_bounds(&self, tile_size: f32) -> TileRect {
        let x0 = ((self.center.x - self.radius) / tile_size).floor() as i32;
        let y0 = ((self.center.y - self.radius) / tile_size).floor() as i32;
        let x1 = ((self.center.x + self.radius) / tile_size).floor() as i32;
        let y1 = ((self.center.y + self.radius) / tile_size).floor() as i32;
        TileRect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldState {
    pub cols: u32,
    pub rows: u32,
    pub tile_size: f32,
    terrain: Vec<TerrainType>,
    pub buildings: BTreeMap<BuildingId, Building>,
    pub resources: BTreeMap<ResourceId, ResourceNode>,
    next_building_id: u32,
    next_resource_id: u32,
}

impl WorldState {
    /// An empty grass world.
    pub fn new(cols: u32, rows: u32, tile_size: f32) -> Self {
        Self {
            cols,
            rows,
            tile_size,
            terrain: vec![TerrainType::Grass; cols as usize * rows as usize],
            buildings: BTreeMap::new(),
            resources: BTreeMap::new(),
            next_building_id: 0,
            next_resource_id: 0,
        }
    }

    pub fn bounds(&self) -> TileRect {
        TileRect::new(0, 0, self.cols as i32, self.rows as i32)
    }

    fn index(&self, tile: TileCoord) -> Option<usize> {
        if tile.x >= 0 && tile.y >= 0 && (tile.x as u32) < self.cols && (tile.y as u32) < self.rows {
            Some(tile.x as usize + tile.y as usize * self.cols as usize)
        } else {
            None
        }
    }

    /// Terrain at a tile; grass outside the map.
    pub fn terrain_at(&self, tile: TileCoord) -> TerrainType {
        self.index(tile)
            .and_then(|i| self.terrain.get(i).copied())
            .unwrap_or_default()
    }

    /// Repaint a rectangle. Returns the clipped rectangle actually changed.
    pub fn set_terrain_rect(&mut self, rect: TileRect, terrain: TerrainType) -> TileRect {
        let clipped = rect.intersect(&self.bounds());
        for tile in clipped.tiles() {
            if let Some(i) = self.index(tile) {
                self.terrain[i] = terrain;
            }
        }
        clipped
    }

    pub fn add_building(&mut self, kind: BuildingKind, footprint: TileRect) -> BuildingId {
        let id = BuildingId(self.next_building_id);
        self.next_building_id += 1;
        self.buildings.insert(
            id,
            Building {
                id,
                kind,
                footprint,
                blocks_movement: kind.default_blocks_movement(),
            },
        );
        id
    }

    pub fn remove_building(&mut self, id: BuildingId) -> Option<Building> {
        self.buildings.remove(&id)
    }

    pub fn add_resource(&mut self, kind: ResourceKind, center: WorldPos, radius: f32) -> ResourceId {
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id += 1;
        self.resources.insert(
            id,
            ResourceNode {
                id,
                kind,
                center,
                radius: radius.max(0.0),
            },
        );
        id
    }

    pub fn remove_resource(&mut self, id: ResourceId) -> Option<ResourceNode> {
        self.resources.remove(&id)
    }

    /// Door buildings in id order.
    pub fn doors(&self) -> impl Iterator<Item = &Building> + '_ {
        self.buildings.values().filter(|b| b.kind == BuildingKind::Door)
    }
}
