//! Core MAPF text formats.
//!
//! Provides the grid-map parser and its companion directed edge-weight
//! parser; the orientation-aware graph and planner built on top of these
//! live in `mapf-pibt`.

mod map;
mod weights;

pub use map::{GridMap, MapError, Tile};
pub use weights::{WeightsError, WeightsTable, CHANNELS, MAX_WEIGHT};
