//! Per-agent state, joint configurations, and the append-only [`Plan`].

use crate::geometry::Orientation;
use crate::grid::{Grid, NodeId};
use tracing::warn;

/// A single agent's position and facing at one timestep.
///
/// `node: None` is the "agent absent at this timestep" sentinel used only
/// inside a [`Plan`]'s stored configs and its validator; states produced or
/// consumed by the live planner (`Agent::curr`, `Agent::goal`) always carry
/// `Some(node)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    pub node: Option<NodeId>,
    pub orientation: Option<Orientation>,
}

impl State {
    pub fn new(node: NodeId, orientation: Orientation) -> Self {
        Self {
            node: Some(node),
            orientation: Some(orientation),
        }
    }

    /// An unoriented live state (direction ignored in neighbour expansion).
    pub fn unoriented(node: NodeId) -> Self {
        Self {
            node: Some(node),
            orientation: None,
        }
    }

    /// The "agent absent" sentinel.
    pub fn absent() -> Self {
        Self {
            node: None,
            orientation: None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.node.is_none()
    }
}

/// One joint state of all agents at a specific tick; index = agent id.
pub type Config = Vec<State>;

/// An append-only sequence of joint configurations.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    configs: Vec<Config>,
}

impl Plan {
    pub fn new() -> Self {
        Self { configs: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Number of agents in every config, or 0 if the plan is empty.
    pub fn width(&self) -> usize {
        self.configs.first().map_or(0, |c| c.len())
    }

    /// Number of committed ticks (plan length minus the initial config).
    pub fn makespan(&self) -> usize {
        self.configs.len().saturating_sub(1)
    }

    /// Append a joint configuration. Panics (invariant violation) if its
    /// width disagrees with previously appended configs.
    pub fn add(&mut self, config: Config) {
        if let Some(first) = self.configs.first() {
            assert_eq!(
                first.len(),
                config.len(),
                "mismatched config width appended to plan"
            );
        }
        self.configs.push(config);
    }

    pub fn get(&self, t: usize) -> &Config {
        &self.configs[t]
    }

    pub fn get_state(&self, t: usize, i: usize) -> State {
        self.configs[t][i]
    }

    /// The final live state of each agent (the last non-absent state on its
    /// path, not necessarily the last tick if the agent vacated its goal
    /// cell for bookkeeping reasons it never re-enters).
    pub fn last_config(&self) -> Config {
        let n = self.width();
        (0..n).map(|i| *self.path(i).last().unwrap()).collect()
    }

    /// The full trajectory of agent `i`, stopping at the first absent state.
    pub fn path(&self, i: usize) -> Vec<State> {
        let mut path = Vec::with_capacity(self.configs.len());
        for t in 0..self.configs.len() {
            let s = self.get_state(t, i);
            if s.is_absent() {
                break;
            }
            path.push(s);
        }
        path
    }

    fn same_config(a: &Config, b: &Config) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
    }

    /// Validate this plan against an explicit start/goal pair: start
    /// equality, goal convergence, config width, and per-tick transition,
    /// vertex-conflict, and edge-conflict legality (spec §4.3). Returns
    /// `false` with a `tracing::warn!` diagnostic on the first failure
    /// rather than panicking — a malformed *input* plan is not a
    /// programming error.
    pub fn validate(&self, grid: &Grid, start: &Config, goal: &Config) -> bool {
        if self.configs.is_empty() {
            warn!(target: "mapf_pibt::state", "validation failed: plan is empty");
            return false;
        }
        if !Self::same_config(&self.last_config(), goal) {
            warn!(target: "mapf_pibt::state", "validation failed: agents did not reach their goal");
            return false;
        }
        if !Self::same_config(self.get(0), start) {
            warn!(target: "mapf_pibt::state", "validation failed: incorrect start states");
            return false;
        }

        let n = self.get(0).len();
        for t in 1..=self.makespan() {
            if self.get(t).len() != n {
                warn!(target: "mapf_pibt::state", "validation failed: ragged configuration at t={t}");
                return false;
            }
            for i in 0..n {
                let curr = self.get_state(t, i);
                if curr.is_absent() {
                    continue;
                }
                let prev = self.get_state(t - 1, i);
                if !Self::is_legal_transition(grid, prev, curr) {
                    return false;
                }
                for j in (i + 1)..n {
                    let other_curr = self.get_state(t, j);
                    let other_prev = self.get_state(t - 1, j);
                    if curr.node == other_curr.node {
                        warn!(target: "mapf_pibt::state", "validation failed: vertex conflict at t={t} between agents {i} and {j}");
                        return false;
                    }
                    if curr.node == other_prev.node && prev.node == other_curr.node {
                        warn!(target: "mapf_pibt::state", "validation failed: edge conflict at t={t} between agents {i} and {j}");
                        return false;
                    }
                }
            }
        }
        true
    }

    fn is_legal_transition(grid: &Grid, prev: State, curr: State) -> bool {
        let (Some(prev_node), Some(curr_node)) = (prev.node, curr.node) else {
            warn!(target: "mapf_pibt::state", "validation failed: live state missing a node");
            return false;
        };
        if !grid.is_neighbor(prev_node, curr_node) && prev_node != curr_node {
            warn!(target: "mapf_pibt::state", "validation failed: agent made an invalid transition");
            return false;
        }
        if prev_node == curr_node {
            let (Some(po), Some(co)) = (prev.orientation, curr.orientation) else {
                // Unoriented mode: staying on the same node is always a wait.
                return true;
            };
            let dtheta = Orientation::delta(co, po);
            if !matches!(dtheta, 0 | 1 | 3) {
                warn!(target: "mapf_pibt::state", "validation failed: illegal single-tick rotation");
                return false;
            }
            true
        } else {
            if prev.orientation != curr.orientation {
                warn!(target: "mapf_pibt::state", "validation failed: move changed orientation");
                return false;
            }
            let Some(po) = prev.orientation else {
                // Unoriented mode: any spatial neighbour move is legal.
                return true;
            };
            if grid.pos(prev_node) + po.unit() != grid.pos(curr_node) {
                warn!(target: "mapf_pibt::state", "validation failed: agent made an invalid move");
                return false;
            }
            true
        }
    }

    /// Render the diagnostic, non-reparseable text dump described in the
    /// external interfaces section: one `[Agent N] : (x,y,o) ...` line per
    /// agent. Requires a position lookup since `Plan` itself only stores
    /// node ids.
    pub fn to_dump_string<F: Fn(NodeId) -> (i32, i32)>(&self, pos_of: F) -> String {
        let mut out = String::new();
        let n = self.width();
        for i in 0..n {
            out.push_str(&format!("[Agent {i:>3}] : "));
            for state in self.path(i) {
                let (x, y) = pos_of(state.node.unwrap());
                let o = state.orientation.map(|o| o.as_index() as i32).unwrap_or(-1);
                out.push_str(&format!("({x:>3},{y:>3},{o:>3}) "));
            }
            out.push('\n');
        }
        out
    }
}
