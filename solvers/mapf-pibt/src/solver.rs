//! Timing, per-agent distance-to-goal precomputation, and lower bounds
//! shared by any solver built on an [`Instance`]. The PIBT planner
//! ([`crate::pibt::Pibt`]) wraps a [`Solver`] the way the reference's
//! `PIBT` class extends `MAPF_Solver`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use mapf_core::MAX_WEIGHT;
use tracing::debug;

use crate::grid::{Grid, NodeId};
use crate::instance::Instance;

/// Per-agent, per-node step count (edges traversed, orientation ignored)
/// to that agent's goal. Unreached cells hold `max_timestep`.
pub type DistanceTable = Vec<Vec<u32>>;

/// Timing plus distance-table bookkeeping that a solver needs before it can
/// run its scheduling loop.
pub struct Solver<'g, 'i> {
    instance: &'i mut Instance<'g>,
    grid: &'g Grid,
    distance_table: DistanceTable,
    distance_initialized: bool,
    lb_soc: Option<u32>,
    lb_makespan: Option<u32>,
    precomp_time: Duration,
    t_start: Option<Instant>,
    comp_time: Duration,
}

impl<'g, 'i> Solver<'g, 'i> {
    pub fn new(instance: &'i mut Instance<'g>) -> Self {
        let grid = instance.grid();
        let n = instance.num_agents();
        let size = grid.size();
        let max_timestep = instance.max_timestep();
        Self {
            instance,
            grid,
            distance_table: vec![vec![max_timestep; size]; n],
            distance_initialized: false,
            lb_soc: None,
            lb_makespan: None,
            precomp_time: Duration::ZERO,
            t_start: None,
            comp_time: Duration::ZERO,
        }
    }

    pub fn instance(&self) -> &Instance<'g> {
        self.instance
    }

    pub fn instance_mut(&mut self) -> &mut Instance<'g> {
        self.instance
    }

    pub fn grid(&self) -> &'g Grid {
        self.grid
    }

    pub fn start_timer(&mut self) {
        self.t_start = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Duration {
        self.t_start.map_or(Duration::ZERO, |t| t.elapsed())
    }

    pub fn over_comp_time(&self) -> bool {
        self.elapsed() >= Duration::from_millis(self.instance.max_comp_time_ms())
    }

    pub fn end_timer(&mut self) {
        self.comp_time = self.elapsed();
    }

    /// Snapshot the elapsed time since `start_timer` as precomputation time
    /// (distance tables and anything else done before the scheduling loop
    /// starts). Call once, right before entering the loop.
    pub fn mark_precomp_time(&mut self) {
        self.precomp_time = self.elapsed();
    }

    pub fn comp_time(&self) -> Duration {
        self.comp_time
    }

    pub fn precomp_time(&self) -> Duration {
        self.precomp_time
    }

    pub fn distance_table(&self) -> &DistanceTable {
        &self.distance_table
    }

    /// Backward Dijkstra from each agent's goal node, relaxed over the
    /// *reverse* of the directed weighted edges (the edge `n -> m` is
    /// relaxed using `get_weight(m, n)`, its actual direction of travel).
    /// Stores the step count, not the summed weight, of the discovered
    /// shortest path to each node.
    pub fn create_distance_table(&mut self) {
        let n = self.instance.num_agents();
        let max_timestep = self.instance.max_timestep();
        let size = self.grid.size();
        self.distance_table = vec![vec![max_timestep; size]; n];

        for i in 0..n {
            let goal = self.instance.goal(i).node.expect("goal must be live");
            let mut cost = vec![MAX_WEIGHT; size];
            cost[goal as usize] = 0.0;
            self.distance_table[i][goal as usize] = 0;

            let mut open: BinaryHeap<Reverse<(ordered_f32::OrderedF32, u32, NodeId)>> = BinaryHeap::new();
            open.push(Reverse((ordered_f32::OrderedF32(0.0), 0, goal)));

            while let Some(Reverse((cn, dn, node))) = open.pop() {
                if cn.0 > cost[node as usize] {
                    continue;
                }
                for &m in &self.grid.node(node).neighbors {
                    let w = self.grid.get_weight(m, node);
                    if w >= MAX_WEIGHT {
                        continue;
                    }
                    let cm = cn.0 + w;
                    let dm = dn + 1;
                    if cm < cost[m as usize] {
                        cost[m as usize] = cm;
                        self.distance_table[i][m as usize] = dm;
                        open.push(Reverse((ordered_f32::OrderedF32(cm), dm, m)));
                    }
                }
            }
        }
        self.distance_initialized = true;
        debug!(target: "mapf_pibt::solver", agents = n, "computed distance tables");
    }

    pub fn distance_initialized(&self) -> bool {
        self.distance_initialized
    }

    /// Step distance from node `u` to node `v`, computed on demand via A★
    /// (not the distance table, which is goal-anchored per agent).
    pub fn path_dist_nodes(&self, u: NodeId, v: NodeId) -> u32 {
        if u == v {
            return 0;
        }
        let s = crate::state::State::unoriented(u);
        let g = crate::state::State::unoriented(v);
        let (path, _) = self
            .grid
            .get_path_with_cost::<rand::rngs::StdRng>(s, g, None, &Default::default());
        (path.len() as u32).saturating_sub(1)
    }

    /// Step distance for agent `i` from node `u` to its goal, via the
    /// precomputed distance table.
    pub fn path_dist(&self, i: usize, u: NodeId) -> u32 {
        self.distance_table[i][u as usize]
    }

    /// Step distance for agent `i` from its start to its goal.
    pub fn path_dist_agent(&self, i: usize) -> u32 {
        let start = self.instance.start(i).node.expect("start must be live");
        self.path_dist(i, start)
    }

    fn compute_lower_bounds(&mut self) {
        let mut soc = 0;
        let mut makespan = 0;
        for i in 0..self.instance.num_agents() {
            let d = self.path_dist_agent(i);
            soc += d;
            makespan = makespan.max(d);
        }
        self.lb_soc = Some(soc);
        self.lb_makespan = Some(makespan);
    }

    /// Sum, over agents, of each agent's shortest step distance from start
    /// to goal. Computed lazily and cached.
    pub fn lower_bound_soc(&mut self) -> u32 {
        if self.lb_soc.is_none() {
            self.compute_lower_bounds();
        }
        self.lb_soc.unwrap()
    }

    /// Maximum, over agents, of each agent's shortest step distance from
    /// start to goal. Computed lazily and cached.
    pub fn lower_bound_makespan(&mut self) -> u32 {
        if self.lb_makespan.is_none() {
            self.compute_lower_bounds();
        }
        self.lb_makespan.unwrap()
    }
}

/// A minimal `Ord`-capable float wrapper so the backward-Dijkstra open set
/// can live in a `BinaryHeap` keyed on cost. Distances here are always
/// finite and non-negative by construction (pruned at `MAX_WEIGHT`).
mod ordered_f32 {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct OrderedF32(pub f32);

    impl Eq for OrderedF32 {}

    impl PartialOrd for OrderedF32 {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for OrderedF32 {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
        }
    }
}
