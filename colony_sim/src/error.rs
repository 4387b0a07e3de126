// Hard-fault errors for the navigation core.
//
// Only data-integrity bugs are errors here: grid arrays that disagree with
// their declared dimensions, non-positive tile costs, an invalid config.
// Expected gameplay outcomes ("can't get there") are never errors. They are
// reported as `PathFailure` (see `pathfinding.rs`) or `None`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavError {
    #[error("grid arrays do not match {cols}x{rows}: solid has {solid_len}, cost has {cost_len}")]
    GridDimensionMismatch {
        cols: u32,
        rows: u32,
        solid_len: usize,
        cost_len: usize,
    },

    #[error("tile ({x}, {y}) has non-positive cost {cost}")]
    NonPositiveCost { x: i32, y: i32, cost: f32 },

    #[error("world is {world_cols}x{world_rows} but nav grid is {grid_cols}x{grid_rows}")]
    WorldGridMismatch {
        world_cols: u32,
        world_rows: u32,
        grid_cols: u32,
        grid_rows: u32,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}
