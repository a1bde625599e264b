//! A fixed start/goal instance, and the `SolverConfig` ambient settings
//! threaded through it.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::InstanceError;
use crate::grid::Grid;
use crate::state::{Config, State};

/// Settings recognized by the solver surface (spec §6), minus the CLI-only
/// fields (`verbose`/`log` become the embedding application's `tracing`
/// subscriber; `solver` is moot since this crate implements exactly one
/// solver; `map` is moot since the caller passes already-loaded map/weights
/// text to [`Grid::from_parts`]).
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Outer-loop step cap.
    pub max_timestep: u32,
    /// Wall-clock cap, in milliseconds.
    pub max_comp_time_ms: u64,
    /// RNG seed, threaded explicitly into [`Instance::new`] rather than the
    /// reference's hard-coded `42` (see design notes).
    pub seed: u64,
    /// Whether the caller intends to load/generate a weights file. Carried
    /// here for parity with the reference's field; this crate's `Grid`
    /// construction takes the weights text directly, so this flag is purely
    /// advisory to the caller.
    pub with_weights: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_timestep: 10_000,
            max_comp_time_ms: 1_000,
            seed: 42,
            with_weights: true,
        }
    }
}

impl SolverConfig {
    pub fn with_max_timestep(mut self, max_timestep: u32) -> Self {
        self.max_timestep = max_timestep;
        self
    }

    pub fn with_max_comp_time_ms(mut self, max_comp_time_ms: u64) -> Self {
        self.max_comp_time_ms = max_comp_time_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_weights(mut self, with_weights: bool) -> Self {
        self.with_weights = with_weights;
        self
    }
}

/// A fixed MAPF instance: start/goal configurations over a [`Grid`], plus
/// the time/step budgets and the seeded RNG the solver draws from.
pub struct Instance<'g> {
    grid: &'g Grid,
    config_s: Config,
    config_g: Config,
    num_agents: usize,
    max_timestep: u32,
    max_comp_time_ms: u64,
    rng: StdRng,
}

impl<'g> Instance<'g> {
    /// Construct an instance from explicit start/goal configurations.
    /// Random instance generation (shuffle + reject) is out of scope for
    /// this crate (spec §1); instances are always built this way.
    pub fn new(
        grid: &'g Grid,
        config_s: Config,
        config_g: Config,
        cfg: &SolverConfig,
    ) -> Result<Self, InstanceError> {
        let num_agents = config_s.len();
        if config_g.len() != num_agents {
            return Err(InstanceError::GoalCountMismatch {
                expected: num_agents,
                got: config_g.len(),
            });
        }
        for (i, s) in config_s.iter().enumerate() {
            if s.node.is_none() {
                return Err(InstanceError::StartMissingNode { agent: i });
            }
        }
        for (i, g) in config_g.iter().enumerate() {
            if g.node.is_none() {
                return Err(InstanceError::GoalMissingNode { agent: i });
            }
        }

        Ok(Self {
            grid,
            config_s,
            config_g,
            num_agents,
            max_timestep: cfg.max_timestep,
            max_comp_time_ms: cfg.max_comp_time_ms,
            rng: StdRng::seed_from_u64(cfg.seed),
        })
    }

    pub fn grid(&self) -> &'g Grid {
        self.grid
    }

    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    pub fn config_start(&self) -> &Config {
        &self.config_s
    }

    pub fn config_goal(&self) -> &Config {
        &self.config_g
    }

    pub fn start(&self, i: usize) -> State {
        self.config_s[i]
    }

    pub fn goal(&self, i: usize) -> State {
        self.config_g[i]
    }

    pub fn max_timestep(&self) -> u32 {
        self.max_timestep
    }

    pub fn max_comp_time_ms(&self) -> u64 {
        self.max_comp_time_ms
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Orientation;
    use crate::grid::test_support::open_3x3;

    #[test]
    fn rejects_mismatched_goal_count() {
        let grid = open_3x3();
        let cfg = SolverConfig::default();
        let starts = vec![State::new(0, Orientation::PlusY)];
        let goals = vec![];
        let err = Instance::new(&grid, starts, goals, &cfg).unwrap_err();
        assert!(matches!(err, InstanceError::GoalCountMismatch { .. }));
    }

    #[test]
    fn rejects_absent_start_state() {
        let grid = open_3x3();
        let cfg = SolverConfig::default();
        let starts = vec![State::absent()];
        let goals = vec![State::new(0, Orientation::PlusY)];
        let err = Instance::new(&grid, starts, goals, &cfg).unwrap_err();
        assert!(matches!(err, InstanceError::StartMissingNode { agent: 0 }));
    }

    #[test]
    fn accepts_matched_configuration() {
        let grid = open_3x3();
        let cfg = SolverConfig::default().with_seed(7);
        let starts = vec![State::new(0, Orientation::PlusY)];
        let goals = vec![State::new(8, Orientation::PlusY)];
        let instance = Instance::new(&grid, starts, goals, &cfg).unwrap();
        assert_eq!(instance.num_agents(), 1);
        assert_eq!(instance.max_timestep(), 10_000);
    }
}
