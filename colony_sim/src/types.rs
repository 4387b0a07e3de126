// Core types shared across the navigation core and the simulation harness.
//
// Defines world-space positions (`WorldPos`), tile coordinates (`TileCoord`,
// `TileRect`), strongly-typed entity identifiers, terrain classification and
// the path-request priority scale. All types derive `Serialize` and
// `Deserialize` for save/load.
//
// World space is a 2D plane measured in world units; the tile grid divides
// it into `tile_size`-sided squares. Conversion between the two lives on
// `TerrainCostGrid` (see `grid.rs`), which knows the tile size.
//
// **Critical constraint: determinism.** IDs are sequential integers handed
// out by their registries in a fixed order. Nothing here draws on OS
// entropy or wall-clock time.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A point in world space. +X is east, +Y is south (screen convention).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: f32,
    pub y: f32,
}

impl WorldPos {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Self) -> f32 {
        self.distance_sq(other).sqrt()
    }

    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    /// Move toward `target` by at most `step` units. Never overshoots.
    pub fn step_toward(self, target: Self, step: f32) -> Self {
        let dist = self.distance(target);
        if dist <= step || dist <= f32::EPSILON {
            return target;
        }
        let t = step / dist;
        Self {
            x: self.x + (target.x - self.x) * t,
            y: self.y + (target.y - self.y) * t,
        }
    }

    /// Bearing from `self` to `other` in radians (atan2 convention).
    pub fn bearing_to(self, other: Self) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// Point at `distance` along `angle` (radians) from `self`.
    pub fn offset_polar(self, angle: f32, distance: f32) -> Self {
        Self {
            x: self.x + angle.cos() * distance,
            y: self.y + angle.sin() * distance,
        }
    }
}

impl fmt::Display for WorldPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Integer tile coordinate. May be out of grid bounds; callers check with
/// `TerrainCostGrid::in_bounds`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance between two tiles.
    pub fn manhattan_distance(self, other: Self) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// Axis-aligned rectangle of tiles: `x..x + width`, `y..y + height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl TileRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn contains(&self, tile: TileCoord) -> bool {
        tile.x >= self.x
            && tile.y >= self.y
            && tile.x < self.x + self.width
            && tile.y < self.y + self.height
    }

    /// Intersection of two rectangles; empty (zero-sized) if disjoint.
    pub fn intersect(&self, other: &TileRect) -> TileRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        TileRect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    /// Grow by `margin` tiles on every side. Empty rectangles stay empty.
    pub fn expanded(&self, margin: i32) -> TileRect {
        if self.is_empty() {
            return *self;
        }
        TileRect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2 * margin,
            self.height + 2 * margin,
        )
    }

    pub fn intersects(&self, other: &TileRect) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Center of the rectangle in tile units (may be fractional).
    pub fn center_tiles(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Iterate tiles row by row.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let (x, width) = (self.x, self.width.max(0));
        (self.y..self.y + self.height.max(0))
            .flat_map(move |y| (x..x + width).map(move |x| TileCoord::new(x, y)))
    }
}

// ---------------------------------------------------------------------------
// Entity IDs: compact sequential integers
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(/// Unique identifier for a mobile agent (colonist, animal, raider).
AgentId);
entity_id!(/// Unique identifier for a placed structure, doors included.
BuildingId);
entity_id!(/// Unique identifier for a circular resource node (tree, rock).
ResourceId);
entity_id!(/// Identifier of a cache-invalidation region (fixed-size chunk).
RegionId);

// ---------------------------------------------------------------------------
// Simulation enums
// ---------------------------------------------------------------------------

/// Per-tile terrain classification. Movement cost and solidity for each
/// type come from `GameConfig::terrain`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TerrainType {
    #[default]
    Grass,
    Road,
    Path,
    Mud,
    Rough,
    Mountain,
    Water,
}

/// Urgency of a path request, derived from the requesting agent's
/// situation. Higher variants are serviced first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathPriority {
    #[default]
    Idle,
    ResourceGathering,
    Work,
    Survival,
    Medical,
    Combat,
}

/// Sprite facing. Updated by the movement controller only while the agent
/// is clearly moving.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    North,
    East,
    #[default]
    South,
    West,
}

impl Facing {
    /// Dominant-axis facing for a movement vector.
    pub fn from_vector(dx: f32, dy: f32) -> Self {
        if dx.abs() >= dy.abs() {
            if dx >= 0.0 { Facing::East } else { Facing::West }
        } else if dy >= 0.0 {
            Facing::South
        } else {
            Facing::North
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_toward_never_overshoots() {
        let a = WorldPos::new(0.0, 0.0);
        let b = WorldPos::new(10.0, 0.0);
        assert_eq!(a.step_toward(b, 4.0), WorldPos::new(4.0, 0.0));
        assert_eq!(a.step_toward(b, 25.0), b);
    }

    #[test]
    fn tile_rect_intersection() {
        let a = TileRect::new(0, 0, 4, 4);
        let b = TileRect::new(2, 3, 5, 5);
        assert_eq!(a.intersect(&b), TileRect::new(2, 3, 2, 1));
        assert!(a.intersects(&b));
        let c = TileRect::new(10, 10, 2, 2);
        assert!(a.intersect(&c).is_empty());
    }

    #[test]
    fn tile_rect_iterates_row_major() {
        let rect = TileRect::new(1, 1, 2, 2);
        let tiles: Vec<_> = rect.tiles().collect();
        assert_eq!(
            tiles,
            vec![
                TileCoord::new(1, 1),
                TileCoord::new(2, 1),
                TileCoord::new(1, 2),
                TileCoord::new(2, 2),
            ]
        );
    }

    #[test]
    fn priority_ordering_matches_urgency() {
        assert!(PathPriority::Combat > PathPriority::Medical);
        assert!(PathPriority::Medical > PathPriority::Survival);
        assert!(PathPriority::Survival > PathPriority::Work);
        assert!(PathPriority::Work > PathPriority::ResourceGathering);
        assert!(PathPriority::ResourceGathering > PathPriority::Idle);
    }

    #[test]
    fn facing_uses_dominant_axis() {
        assert_eq!(Facing::from_vector(5.0, 1.0), Facing::East);
        assert_eq!(Facing::from_vector(-5.0, 1.0), Facing::West);
        assert_eq!(Facing::from_vector(0.5, -3.0), Facing::North);
        assert_eq!(Facing::from_vector(0.0, 3.0), Facing::South);
    }
}
