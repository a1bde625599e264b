//! Configuration-error types for the orientation-aware grid and instance
//! setup. Invariant violations (an inconsistent reservation table, an
//! out-of-range orientation, a non-neighbour move) are programming errors
//! and `panic!` instead, per the three-way split in the design notes.

use thiserror::Error;

/// Errors constructing a [`crate::Grid`] from a parsed map and optional
/// weights text.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("map parsing failed: {0}")]
    Map(#[from] mapf_core::MapError),

    #[error("weights parsing failed: {0}")]
    Weights(#[from] mapf_core::WeightsError),
}

/// Errors constructing an [`crate::Instance`].
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("goal configuration has {got} agents, expected {expected}")]
    GoalCountMismatch { expected: usize, got: usize },

    #[error("agent {agent} start state has no node")]
    StartMissingNode { agent: usize },

    #[error("agent {agent} goal state has no node")]
    GoalMissingNode { agent: usize },
}
