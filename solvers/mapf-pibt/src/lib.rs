//! Orientation-aware weighted-grid pathfinding and priority-inheritance
//! multi-agent scheduling (PIBT).
//!
//! Builds on `mapf-core`'s text formats to provide the directed, weighted,
//! 4-neighbour grid with per-agent facing; single-agent weighted A★ search
//! over that grid; and a single-shot, per-timestep, decentralized planner
//! that produces a collision-free joint plan across agents.
//!
//! ## Features
//! - Directed weighted grid with orientation-aware neighbour expansion
//! - Weighted A★ in the composite (node × orientation) state space
//! - Priority-inheritance joint-action planning (PIBT)
//! - Plan validation: vertex, edge, transition, and rotation legality

mod error;
mod geometry;
mod grid;
mod instance;
mod pibt;
mod solver;
mod state;

pub use error::{GridError, InstanceError};
pub use geometry::{Orientation, Pos};
pub use grid::{Grid, Node, NodeId};
pub use instance::{Instance, SolverConfig};
pub use pibt::{Pibt, Solution};
pub use solver::{DistanceTable, Solver};
pub use state::{Config, Plan, State};
