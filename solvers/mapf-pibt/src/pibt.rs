//! Priority Inheritance with Backtracking (PIBT): a one-step-lookahead,
//! per-tick decentralized scheduler. At every tick it assigns a next node
//! to every agent such that no two agents reserve the same node and no two
//! adjacent agents swap, then derives and commits a wait/turn/move action
//! for each.

use std::cmp::Ordering;
use std::time::Duration;

use mapf_core::MAX_WEIGHT;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::geometry::Orientation;
use crate::grid::{Grid, NodeId};
use crate::instance::Instance;
use crate::solver::{DistanceTable, Solver};
use crate::state::{Config, Plan, State};

/// A next-tick action derived from `(curr, next, goal)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Wait,
    Move,
    TurnLeft,
    TurnRight,
}

/// PIBT-internal bookkeeping for one agent over the lifetime of a single
/// `solve()` call.
#[derive(Debug, Clone, Copy)]
struct Agent {
    curr: State,
    /// Next node tentatively reserved this tick, if any.
    next: Option<NodeId>,
    goal: State,
    /// Steps elapsed since the agent's start (frozen once `done`).
    elapsed: u32,
    /// Step distance from start to goal at t=0; used only for priority.
    init_dist: u32,
    /// Uniform tie-break draw in `[0, 1)`.
    epsilon: f32,
    done: bool,
}

/// The outcome of a `Pibt::solve()` call: the produced plan, whether every
/// agent reached its goal, and the lower bounds / timings computed along
/// the way.
pub struct Solution {
    plan: Plan,
    solved: bool,
    lb_soc: u32,
    lb_makespan: u32,
    precomp_time: Duration,
    comp_time: Duration,
}

impl Solution {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn succeed(&self) -> bool {
        self.solved
    }

    pub fn makespan(&self) -> usize {
        self.plan.makespan()
    }

    pub fn lower_bound_soc(&self) -> u32 {
        self.lb_soc
    }

    pub fn lower_bound_makespan(&self) -> u32 {
        self.lb_makespan
    }

    pub fn precomp_time(&self) -> Duration {
        self.precomp_time
    }

    pub fn comp_time(&self) -> Duration {
        self.comp_time
    }
}

/// The PIBT planner. Borrows an [`Instance`] through a [`Solver`], the way
/// the reference's `PIBT` class extends `MAPF_Solver`.
pub struct Pibt<'g, 'i> {
    solver: Solver<'g, 'i>,
}

impl<'g, 'i> Pibt<'g, 'i> {
    pub fn new(instance: &'i mut Instance<'g>) -> Self {
        Self {
            solver: Solver::new(instance),
        }
    }

    /// Run PIBT to completion or failure. Consumes `self` since a solver is
    /// scoped to a single run, matching the reference's `solve()` lifecycle.
    pub fn solve(mut self) -> Solution {
        self.solver.start_timer();
        self.solver.create_distance_table();
        self.solver.mark_precomp_time();
        let (plan, solved) = self.run();
        self.solver.end_timer();

        let lb_soc = self.solver.lower_bound_soc();
        let lb_makespan = self.solver.lower_bound_makespan();
        Solution {
            plan,
            solved,
            lb_soc,
            lb_makespan,
            precomp_time: self.solver.precomp_time(),
            comp_time: self.solver.comp_time(),
        }
    }

    fn run(&mut self) -> (Plan, bool) {
        info!(target: "mapf_pibt::pibt", "running PIBT");
        let n = self.solver.instance().num_agents();
        let grid = self.solver.grid();
        let distance_table = self.solver.distance_table().clone();
        let max_timestep = self.solver.instance().max_timestep();

        let mut occupied_now: Vec<Option<usize>> = vec![None; grid.size()];
        let mut occupied_next: Vec<Option<usize>> = vec![None; grid.size()];

        let mut agents: Vec<Agent> = Vec::with_capacity(n);
        for i in 0..n {
            let s = self.solver.instance().start(i);
            let g = self.solver.instance().goal(i);
            let init_dist = self.solver.path_dist_agent(i);
            let epsilon = self.solver.instance_mut().rng_mut().gen::<f32>();
            agents.push(Agent {
                curr: s,
                next: None,
                goal: g,
                elapsed: 0,
                init_dist,
                epsilon,
                done: false,
            });
            occupied_now[s.node.unwrap() as usize] = Some(i);
        }

        // Priority order: sorted once, descending by (elapsed, init_dist,
        // epsilon). Ticks mutate `elapsed` but the order itself is frozen.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| priority_cmp(&agents[a], &agents[b]));

        let mut plan = Plan::new();
        plan.add(self.solver.instance().config_start().clone());

        let mut timestep: u32 = 0;
        let solved;
        loop {
            // Phase 1: reserve.
            for &id in &order {
                if agents[id].done || agents[id].next.is_some() {
                    continue;
                }
                let rng = self.solver.instance_mut().rng_mut();
                func_pibt(grid, &distance_table, &mut occupied_now, &mut occupied_next, &mut agents, rng, id, None);
            }

            // Phase 2: derive actions.
            let mut actions: Vec<Option<Action>> = vec![None; n];
            for &id in &order {
                if agents[id].done {
                    continue;
                }
                let a = agents[id];
                let next = a.next.expect("agent must have a reservation after phase 1");
                actions[id] = Some(derive_action(grid, a.curr, next, a.goal));
            }

            // Phase 3: commit.
            let mut config: Config = vec![State::absent(); n];
            for &id in &order {
                if agents[id].done {
                    continue;
                }
                if agents[id].next.is_none() {
                    continue; // already committed via recursion
                }
                match actions[id].expect("action must be derived before commit") {
                    Action::Wait => commit_wait(&mut agents, &mut occupied_next, id, &mut config),
                    Action::TurnLeft | Action::TurnRight => {
                        let action = actions[id].unwrap();
                        commit_turn(&mut agents, &mut occupied_next, id, action, &mut config)
                    }
                    Action::Move => {
                        commit_move(&mut agents, &mut occupied_now, &mut occupied_next, &actions, id, &mut config);
                    }
                }
            }
            plan.add(config);

            // Phase 4: retire.
            let mut all_done = true;
            for &id in &order {
                if agents[id].done {
                    continue;
                }
                if agents[id].curr == agents[id].goal {
                    let node = agents[id].curr.node.unwrap();
                    assert_eq!(occupied_now[node as usize], Some(id), "inconsistent plan");
                    occupied_now[node as usize] = None;
                    agents[id].done = true;
                } else {
                    all_done = false;
                }
            }

            timestep += 1;
            if all_done {
                solved = true;
                break;
            }
            if timestep >= max_timestep {
                warn!(target: "mapf_pibt::pibt", "exceeded maximum number of timesteps");
                solved = false;
                break;
            }
            if self.solver.over_comp_time() {
                warn!(target: "mapf_pibt::pibt", "exceeded maximum computation time limit");
                solved = false;
                break;
            }
        }

        (plan, solved)
    }
}

fn priority_cmp(a: &Agent, b: &Agent) -> Ordering {
    b.elapsed
        .cmp(&a.elapsed)
        .then_with(|| b.init_dist.cmp(&a.init_dist))
        .then_with(|| b.epsilon.partial_cmp(&a.epsilon).unwrap_or(Ordering::Equal))
}

/// The recursive candidate-selection routine with priority inheritance.
/// Returns `true` if `a` reserved a node other than a forced wait; `false`
/// if every candidate was exhausted and `a` fell back to waiting at its
/// current node.
fn func_pibt(
    grid: &Grid,
    distance_table: &DistanceTable,
    occupied_now: &mut [Option<usize>],
    occupied_next: &mut [Option<usize>],
    agents: &mut [Agent],
    rng: &mut impl Rng,
    a_id: usize,
    b_id: Option<usize>,
) -> bool {
    let a_curr = agents[a_id].curr;
    let a_node = a_curr.node.expect("agent must have a live state");

    let mut candidates: Vec<NodeId> = grid
        .node(a_node)
        .neighbors
        .iter()
        .copied()
        .filter(|&n| grid.get_weight(a_node, n) < MAX_WEIGHT)
        .collect();
    candidates.push(a_node);
    candidates.shuffle(rng);

    let forward_target = a_curr.orientation.map(|o| grid.pos(a_node) + o.unit());
    candidates.sort_by(|&u, &v| {
        let du = distance_table[a_id][u as usize];
        let dv = distance_table[a_id][v as usize];
        if du != dv {
            return du.cmp(&dv);
        }
        if let Some(fp) = forward_target {
            let u_is_forward = grid.pos(u) == fp;
            let v_is_forward = grid.pos(v) == fp;
            if u_is_forward != v_is_forward {
                return if u_is_forward { Ordering::Less } else { Ordering::Greater };
            }
        }
        let u_empty = occupied_now[u as usize].is_none();
        let v_empty = occupied_now[v as usize].is_none();
        if u_empty != v_empty {
            return if u_empty { Ordering::Less } else { Ordering::Greater };
        }
        Ordering::Equal
    });

    for v in candidates {
        if occupied_next[v as usize].is_some() {
            continue;
        }
        if let Some(b) = b_id {
            if Some(v) == agents[b].curr.node {
                continue; // would hand b the swap it's trying to escape
            }
        }
        occupied_next[v as usize] = Some(a_id);
        agents[a_id].next = Some(v);

        if let Some(k) = occupied_now[v as usize] {
            if agents[k].next.is_none()
                && !func_pibt(grid, distance_table, occupied_now, occupied_next, agents, rng, k, Some(a_id))
            {
                // k's own forced-wait fallback already reserved v for
                // itself (its self-wait always targets v, since
                // k = occupied_now[v]); leave that reservation alone and
                // just try a's next candidate.
                continue;
            }
        }
        return true;
    }

    // No viable candidate: forced wait.
    occupied_next[a_node as usize] = Some(a_id);
    agents[a_id].next = Some(a_node);
    false
}

fn derive_action(grid: &Grid, curr: State, next: NodeId, goal: State) -> Action {
    let curr_node = curr.node.expect("agent must have a live state");
    if next == curr_node {
        if Some(next) == goal.node {
            let o = curr.orientation.expect("oriented goal requires oriented agent");
            let go = goal.orientation.expect("goal must carry an orientation");
            let dtheta = Orientation::delta(go, o);
            return match dtheta {
                0 => Action::Wait,
                1 | 2 => Action::TurnLeft,
                _ => Action::TurnRight,
            };
        }
        return Action::Wait;
    }
    let Some(o) = curr.orientation else {
        return Action::Move;
    };
    let target = grid.direction_to(curr_node, next);
    if target == o {
        Action::Move
    } else {
        let dtheta = Orientation::delta(target, o);
        if matches!(dtheta, 1 | 2) {
            Action::TurnLeft
        } else {
            Action::TurnRight
        }
    }
}

fn commit_wait(agents: &mut [Agent], occupied_next: &mut [Option<usize>], a_id: usize, config: &mut Config) {
    let next = agents[a_id].next.expect("agent has no reservation to clear");
    assert_eq!(occupied_next[next as usize], Some(a_id), "inconsistent plan");
    occupied_next[next as usize] = None;
    agents[a_id].next = None;
    agents[a_id].elapsed += 1;
    config[a_id] = agents[a_id].curr;
}

fn commit_turn(agents: &mut [Agent], occupied_next: &mut [Option<usize>], a_id: usize, action: Action, config: &mut Config) {
    let next = agents[a_id].next.expect("agent has no reservation to clear");
    assert_eq!(occupied_next[next as usize], Some(a_id), "inconsistent plan");
    occupied_next[next as usize] = None;
    agents[a_id].next = None;

    let o = agents[a_id].curr.orientation.expect("turning agent must be oriented");
    let new_o = match action {
        Action::TurnLeft => o.turn_left(),
        Action::TurnRight => o.turn_right(),
        _ => unreachable!("commit_turn called with a non-turn action"),
    };
    agents[a_id].curr = State::new(agents[a_id].curr.node.unwrap(), new_o);
    agents[a_id].elapsed += 1;
    config[a_id] = agents[a_id].curr;
}

/// Commit a MOVE action, resolving any dependency chain through occupied
/// cells. Returns `true` if `a` physically moved, `false` if it was
/// downgraded to WAIT.
fn commit_move(
    agents: &mut [Agent],
    occupied_now: &mut [Option<usize>],
    occupied_next: &mut [Option<usize>],
    actions: &[Option<Action>],
    a_id: usize,
    config: &mut Config,
) -> bool {
    let next = agents[a_id].next.expect("agent has no reservation to clear");
    assert_eq!(occupied_next[next as usize], Some(a_id), "inconsistent plan");

    if occupied_now[next as usize].is_none() {
        complete_move(agents, occupied_now, occupied_next, a_id, next, config);
        return true;
    }

    let b_id = occupied_now[next as usize].unwrap();
    let b_will_move = actions[b_id] == Some(Action::Move) && agents[b_id].next.is_some();
    if !b_will_move {
        commit_wait(agents, occupied_next, a_id, config);
        return false;
    }

    let curr_node = agents[a_id].curr.node.unwrap();
    assert_eq!(occupied_now[curr_node as usize], Some(a_id), "inconsistent plan");
    occupied_now[curr_node as usize] = None; // temporarily release to let b's move see it as free, if relevant

    if !commit_move(agents, occupied_now, occupied_next, actions, b_id, config) {
        occupied_now[curr_node as usize] = Some(a_id);
        commit_wait(agents, occupied_next, a_id, config);
        return false;
    }

    assert!(occupied_now[next as usize].is_none(), "inconsistent plan");
    complete_move(agents, occupied_now, occupied_next, a_id, next, config);
    true
}

fn complete_move(
    agents: &mut [Agent],
    occupied_now: &mut [Option<usize>],
    occupied_next: &mut [Option<usize>],
    a_id: usize,
    next: NodeId,
    config: &mut Config,
) {
    occupied_now[next as usize] = Some(a_id);
    let o = agents[a_id].curr.orientation;
    agents[a_id].curr = State { node: Some(next), orientation: o };
    occupied_next[next as usize] = None;
    agents[a_id].next = None;
    agents[a_id].elapsed += 1;
    config[a_id] = agents[a_id].curr;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::test_support::open_3x3;
    use crate::instance::SolverConfig;
    use mapf_core::GridMap;

    fn warehouse_grid() -> Grid {
        // A small corridor with a single-cell bottleneck, enough to force
        // agents to take turns.
        let map = GridMap::parse("height 3\nwidth 3\nmap\n.@.\n...\n.@.\n").unwrap();
        Grid::from_parts(&map, None).unwrap()
    }

    #[test]
    fn single_agent_reaches_goal_immediately_if_already_there() {
        let grid = open_3x3();
        let cfg = SolverConfig::default();
        let s = State::new(0, Orientation::PlusY);
        let starts = vec![s];
        let goals = vec![s];
        let mut instance = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution = Pibt::new(&mut instance).solve();
        assert!(solution.succeed());
        assert!(solution.plan().validate(&grid, &starts, &goals));
    }

    #[test]
    fn single_agent_crosses_the_grid() {
        let grid = open_3x3();
        let cfg = SolverConfig::default();
        let starts = vec![State::new(0, Orientation::PlusY)];
        let goals = vec![State::new(8, Orientation::PlusY)];
        let mut instance = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution = Pibt::new(&mut instance).solve();
        assert!(solution.succeed());
        assert!(solution.plan().validate(&grid, &starts, &goals));
        assert!(solution.makespan() as u32 >= solution.lower_bound_makespan());
    }

    #[test]
    fn two_agents_swap_sides_without_colliding() {
        let grid = open_3x3();
        let cfg = SolverConfig::default().with_seed(7);
        let starts = vec![State::new(0, Orientation::PlusY), State::new(8, Orientation::MinusY)];
        let goals = vec![State::new(8, Orientation::PlusY), State::new(0, Orientation::MinusY)];
        let mut instance = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution = Pibt::new(&mut instance).solve();
        assert!(solution.succeed());
        assert!(solution.plan().validate(&grid, &starts, &goals));
    }

    #[test]
    fn agents_share_a_single_cell_bottleneck() {
        let grid = warehouse_grid();
        let cfg = SolverConfig::default().with_max_timestep(200);
        // Both sides of the bottleneck at (1,1), approaching from (0,1) and (2,1).
        let starts = vec![State::new(3, Orientation::PlusX), State::new(5, Orientation::MinusX)];
        let goals = vec![State::new(5, Orientation::PlusX), State::new(3, Orientation::MinusX)];
        let mut instance = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution = Pibt::new(&mut instance).solve();
        assert!(solution.succeed());
        assert!(solution.plan().validate(&grid, &starts, &goals));
    }

    #[test]
    fn two_agents_converge_on_a_shared_goal_cell() {
        // Both agents' goal is the same (node, orientation). Legal because
        // the first to arrive retires and vacates the cell before the
        // second one gets there.
        let grid = open_3x3();
        let cfg = SolverConfig::default();
        let shared_goal = State::new(4, Orientation::PlusY);
        let starts = vec![State::new(0, Orientation::PlusY), State::new(8, Orientation::MinusY)];
        let goals = vec![shared_goal, shared_goal];
        let mut instance = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution = Pibt::new(&mut instance).solve();
        assert!(solution.succeed());
        assert!(solution.plan().validate(&grid, &starts, &goals));
    }

    #[test]
    fn rotate_at_goal_splits_180_into_two_left_turns() {
        let grid = open_3x3();
        let cfg = SolverConfig::default();
        let starts = vec![State::new(0, Orientation::PlusY)];
        let goals = vec![State::new(0, Orientation::MinusY)];
        let mut instance = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution = Pibt::new(&mut instance).solve();
        assert!(solution.succeed());
        assert!(solution.plan().validate(&grid, &starts, &goals));
        assert_eq!(solution.makespan(), 2);
    }

    #[test]
    fn three_agents_converge_on_adjacent_goals() {
        let grid = open_3x3();
        let cfg = SolverConfig::default();
        // Three corners converge toward the center neighbourhood, each
        // claiming a distinct cell next to it.
        let starts = vec![
            State::new(0, Orientation::PlusY),
            State::new(2, Orientation::MinusX),
            State::new(6, Orientation::PlusX),
        ];
        let goals = vec![
            State::new(3, Orientation::PlusY),
            State::new(5, Orientation::MinusX),
            State::new(4, Orientation::PlusX),
        ];
        let mut instance = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution = Pibt::new(&mut instance).solve();
        assert!(solution.succeed());
        assert!(solution.plan().validate(&grid, &starts, &goals));
    }

    #[test]
    fn four_agents_with_divergent_goals() {
        let grid = open_3x3();
        let cfg = SolverConfig::default();
        let starts = vec![
            State::new(0, Orientation::PlusY),
            State::new(2, Orientation::MinusX),
            State::new(8, Orientation::MinusY),
            State::new(6, Orientation::PlusX),
        ];
        let goals = vec![
            State::new(8, Orientation::PlusY),
            State::new(6, Orientation::MinusX),
            State::new(0, Orientation::MinusY),
            State::new(2, Orientation::PlusX),
        ];
        let mut instance = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution = Pibt::new(&mut instance).solve();
        assert!(solution.succeed());
        assert!(solution.plan().validate(&grid, &starts, &goals));
    }

    #[test]
    fn determinism_same_seed_same_plan() {
        let grid = open_3x3();
        let cfg = SolverConfig::default().with_seed(99);
        let starts = vec![State::new(0, Orientation::PlusY), State::new(2, Orientation::PlusY), State::new(6, Orientation::PlusY)];
        let goals = vec![State::new(8, Orientation::PlusY), State::new(6, Orientation::PlusY), State::new(2, Orientation::PlusY)];

        let mut instance_a = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution_a = Pibt::new(&mut instance_a).solve();

        let mut instance_b = Instance::new(&grid, starts.clone(), goals.clone(), &cfg).unwrap();
        let solution_b = Pibt::new(&mut instance_b).solve();

        assert_eq!(solution_a.succeed(), solution_b.succeed());
        assert_eq!(solution_a.makespan(), solution_b.makespan());
        for t in 0..=solution_a.makespan() {
            assert_eq!(solution_a.plan().get(t), solution_b.plan().get(t));
        }
    }
}
