// A* pathfinding over the tile cost grid.
//
// Implements 8-directional A* using a `BinaryHeap` (min-heap via reversed
// ordering). Scores, predecessor links and closed markers live in flat
// `Vec`s sized `cols * rows` inside a reusable `PathFinder`; a generation
// counter invalidates them between searches instead of refilling.
//
// Step costs use the destination tile's multiplier: 1.0x orthogonally,
// 1.41421356x diagonally. A diagonal move is rejected only when both
// orthogonal tiles it passes between are solid. The heuristic is Manhattan
// tile distance scaled by `max(1e-4, min_cost) * 0.9999`. Because it can
// overestimate across diagonals, a closed node whose g-score improves is
// reopened.
//
// Every node of a returned path is an exact tile center, start tile and
// goal tile included, with no smoothing.
//
// See also: `grid.rs` for the grid being searched, `navigator.rs` which
// owns a finder for synchronous queries, `path_queue.rs` whose jobs are
// resolved on per-worker finders.
//
// **Critical constraint: determinism.** A* is a pure function of grid
// state and endpoints. Heap ties on f-score go to the earliest-inserted
// entry (monotonic sequence number), and neighbors expand in a fixed order.

use crate::grid::TerrainCostGrid;
use crate::types::{TileCoord, WorldPos};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub const DIAGONAL_COST: f32 = 1.414_213_56;

const HEURISTIC_SCALE: f32 = 0.9999;
const MIN_HEURISTIC_COST: f32 = 1e-4;
const NO_PARENT: u32 = u32::MAX;

/// Orthogonal first, then diagonal. Order is part of the determinism
/// contract.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Why a search produced no path. All variants mean "can't get there" to
/// callers; they are kept apart for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathFailure {
    OutOfBounds,
    SameTile,
    SolidEndpoint,
    NoPathFound,
}

/// A successful search.
#[derive(Clone, Debug, PartialEq)]
pub struct PathResult {
    /// Tile centers from start to goal (inclusive).
    pub nodes: Vec<WorldPos>,
    /// The tiles behind `nodes`.
    pub tiles: Vec<TileCoord>,
    /// Sum of step costs.
    pub total_cost: f32,
}

impl PathResult {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Entry in the open set (min-heap via reversed ordering).
struct OpenEntry {
    f_score: f32,
    g_score: f32,
    seq: u32,
    node: u32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score, then earliest seq, is
        // "greatest".
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Reusable A* scratch space.
#[derive(Default)]
pub struct PathFinder {
    g_score: Vec<f32>,
    came_from: Vec<u32>,
    /// Generation in which `g_score`/`came_from` were last written.
    touched: Vec<u32>,
    /// Generation in which the node was last closed.
    closed: Vec<u32>,
    generation: u32,
    open: BinaryHeap<OpenEntry>,
    last_expanded: usize,
}

impl PathFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes expanded by the most recent search.
    pub fn last_expanded(&self) -> usize {
        self.last_expanded
    }

    fn prepare(&mut self, n: usize) {
        if self.g_score.len() != n {
            self.g_score = vec![f32::INFINITY; n];
            self.came_from = vec![NO_PARENT; n];
            self.touched = vec![0; n];
            self.closed = vec![0; n];
            self.generation = 0;
        }
        if self.generation == u32::MAX {
            self.touched.fill(0);
            self.closed.fill(0);
            self.generation = 0;
        }
        self.generation += 1;
        self.open.clear();
        self.last_expanded = 0;
    }

    fn g(&self, i: usize) -> f32 {
        if self.touched[i] == self.generation {
            self.g_score[i]
        } else {
            f32::INFINITY
        }
    }

    /// Least-cost path between the tiles containing two world points.
    pub fn find_path(
        &mut self,
        grid: &TerrainCostGrid,
        start: WorldPos,
        goal: WorldPos,
    ) -> Result<PathResult, PathFailure> {
        self.find_path_tiles(grid, grid.tile_of(start), grid.tile_of(goal))
    }

    pub fn find_path_tiles(
        &mut self,
        grid: &TerrainCostGrid,
        start: TileCoord,
        goal: TileCoord,
    ) -> Result<PathResult, PathFailure> {
        let (Some(si), Some(gi)) = (grid.index(start), grid.index(goal)) else {
            return Err(PathFailure::OutOfBounds);
        };
        if si == gi {
            return Err(PathFailure::SameTile);
        }
        if grid.is_solid(start) || grid.is_solid(goal) {
            return Err(PathFailure::SolidEndpoint);
        }

        self.prepare(grid.tile_count());
        let gen_id = self.generation;
        let h_scale = grid.min_cost().max(MIN_HEURISTIC_COST) * HEURISTIC_SCALE;
        let heuristic = |tile: TileCoord| tile.manhattan_distance(goal) as f32 * h_scale;

        let mut seq = 0u32;
        self.g_score[si] = 0.0;
        self.came_from[si] = NO_PARENT;
        self.touched[si] = gen_id;
        self.open.push(OpenEntry {
            f_score: heuristic(start),
            g_score: 0.0,
            seq,
            node: si as u32,
        });

        while let Some(current) = self.open.pop() {
            let ci = current.node as usize;
            if current.g_score > self.g(ci) {
                continue; // Superseded by a cheaper push.
            }
            if ci == gi {
                return Ok(self.reconstruct(grid, si, gi));
            }
            self.closed[ci] = gen_id;
            self.last_expanded += 1;

            let here = grid.coord_of(ci);
            let current_g = current.g_score;
            for (dx, dy) in DIRECTIONS {
                let next = here.offset(dx, dy);
                let Some(ni) = grid.index(next) else {
                    continue;
                };
                if grid.is_solid(next) {
                    continue;
                }
                let diagonal = dx != 0 && dy != 0;
                if diagonal && grid.is_solid(here.offset(dx, 0)) && grid.is_solid(here.offset(0, dy)) {
                    continue;
                }
                let step = if diagonal { DIAGONAL_COST } else { 1.0 };
                let tentative = current_g + step * grid.cost_at(next);
                if tentative < self.g(ni) {
                    self.g_score[ni] = tentative;
                    self.came_from[ni] = ci as u32;
                    self.touched[ni] = gen_id;
                    if self.closed[ni] == gen_id {
                        // Reopen.
                        self.closed[ni] = 0;
                    }
                    seq += 1;
                    self.open.push(OpenEntry {
                        f_score: tentative + heuristic(next),
                        g_score: tentative,
                        seq,
                        node: ni as u32,
                    });
                }
            }
        }

        Err(PathFailure::NoPathFound)
    }

    fn reconstruct(&self, grid: &TerrainCostGrid, start: usize, goal: usize) -> PathResult {
        let mut tiles = Vec::new();
        let mut current = goal;
        loop {
            tiles.push(grid.coord_of(current));
            if current == start {
                break;
            }
            let prev = self.came_from[current];
            if prev == NO_PARENT {
                break;
            }
            current = prev as usize;
        }
        tiles.reverse();
        let nodes = tiles.iter().map(|&t| grid.tile_center(t)).collect();
        PathResult {
            nodes,
            tiles,
            total_cost: self.g_score[goal],
        }
    }
}

/// One-shot search with fresh scratch space.
pub fn find_path(
    grid: &TerrainCostGrid,
    start: WorldPos,
    goal: WorldPos,
) -> Result<PathResult, PathFailure> {
    PathFinder::new().find_path(grid, start, goal)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: f32 = 32.0;

    fn center(x: i32, y: i32) -> WorldPos {
        WorldPos::new(x as f32 * TS + TS / 2.0, y as f32 * TS + TS / 2.0)
    }

    fn solid(grid: &mut TerrainCostGrid, x: i32, y: i32) {
        grid.set_tile(TileCoord::new(x, y), true, 1.0).unwrap();
    }

    #[test]
    fn straight_line_visits_every_tile_center() {
        let grid = TerrainCostGrid::new(10, 3, TS);
        let path = find_path(&grid, center(0, 1), center(5, 1)).unwrap();
        assert_eq!(path.len(), 6);
        for (i, node) in path.nodes.iter().enumerate() {
            assert_eq!(*node, center(i as i32, 1));
        }
        assert!((path.total_cost - 5.0).abs() < 1e-5);
    }

    #[test]
    fn nodes_are_tile_centers_even_for_off_center_endpoints() {
        let grid = TerrainCostGrid::new(8, 8, TS);
        let path = find_path(&grid, WorldPos::new(3.0, 60.0), WorldPos::new(200.5, 129.9)).unwrap();
        for node in &path.nodes {
            assert_eq!(node.x % TS, TS / 2.0);
            assert_eq!(node.y % TS, TS / 2.0);
        }
        assert_eq!(*path.nodes.last().unwrap(), center(6, 4));
        assert_eq!(path.nodes[0], center(0, 1));
    }

    #[test]
    fn endpoint_failures_are_distinguished() {
        let mut grid = TerrainCostGrid::new(5, 5, TS);
        solid(&mut grid, 4, 4);
        assert_eq!(
            find_path(&grid, center(0, 0), center(9, 0)),
            Err(PathFailure::OutOfBounds)
        );
        assert_eq!(
            find_path(&grid, center(1, 1), WorldPos::new(40.0, 60.0)),
            Err(PathFailure::SameTile)
        );
        assert_eq!(
            find_path(&grid, center(0, 0), center(4, 4)),
            Err(PathFailure::SolidEndpoint)
        );
    }

    #[test]
    fn sealed_wall_means_no_path() {
        let mut grid = TerrainCostGrid::new(6, 6, TS);
        for y in 0..6 {
            solid(&mut grid, 3, y);
        }
        assert_eq!(
            find_path(&grid, center(0, 0), center(5, 5)),
            Err(PathFailure::NoPathFound)
        );
    }

    #[test]
    fn diagonal_between_two_solid_corners_is_rejected() {
        let mut grid = TerrainCostGrid::new(5, 5, TS);
        solid(&mut grid, 2, 1);
        solid(&mut grid, 1, 2);
        let path = find_path(&grid, center(1, 1), center(2, 2)).unwrap();
        assert!(path.len() > 2, "must detour around the pinched corner");
        for pair in path.tiles.windows(2) {
            assert!(
                !(pair[0] == TileCoord::new(1, 1) && pair[1] == TileCoord::new(2, 2)),
                "cut through the corner"
            );
        }
    }

    #[test]
    fn diagonal_past_one_solid_corner_is_allowed() {
        let mut grid = TerrainCostGrid::new(5, 5, TS);
        solid(&mut grid, 2, 1);
        let path = find_path(&grid, center(1, 1), center(2, 2)).unwrap();
        assert_eq!(path.tiles, vec![TileCoord::new(1, 1), TileCoord::new(2, 2)]);
    }

    #[test]
    fn mud_is_routed_around() {
        let mut grid = TerrainCostGrid::new(7, 3, TS);
        for x in 1..6 {
            grid.set_tile(TileCoord::new(x, 1), false, 5.0).unwrap();
        }
        let path = find_path(&grid, center(0, 1), center(6, 1)).unwrap();
        assert!(path.total_cost < 10.0);
        assert!(path.tiles[1..path.len() - 1].iter().all(|t| t.y != 1));
    }

    #[test]
    fn scratch_reuse_is_deterministic() {
        let mut grid = TerrainCostGrid::new(12, 12, TS);
        for y in 2..10 {
            solid(&mut grid, 6, y);
        }
        let mut finder = PathFinder::new();
        let a = finder.find_path(&grid, center(1, 5), center(10, 6)).unwrap();
        let _ = finder.find_path(&grid, center(0, 0), center(11, 11)).unwrap();
        let b = finder.find_path(&grid, center(1, 5), center(10, 6)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, find_path(&grid, center(1, 5), center(10, 6)).unwrap());
    }

    #[test]
    fn scratch_resizes_between_grids() {
        let mut finder = PathFinder::new();
        let small = TerrainCostGrid::new(3, 3, TS);
        let large = TerrainCostGrid::new(9, 9, TS);
        assert!(finder.find_path(&small, center(0, 0), center(2, 2)).is_ok());
        let path = finder.find_path(&large, center(0, 0), center(8, 8)).unwrap();
        assert_eq!(path.len(), 9);
    }
}
