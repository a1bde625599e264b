//! The static weighted graph: `Node`/`Grid` construction from a parsed map,
//! orientation-aware neighbour expansion, directed edge-weight lookup, and
//! single-agent weighted A★ search in the composite (node × orientation)
//! space.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use mapf_core::{GridMap, WeightsTable, CHANNELS, MAX_WEIGHT};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::error::GridError;
use crate::geometry::{Orientation, Pos};
use crate::state::State;

/// Stable integer identity of a passable cell: `y * width + x`.
pub type NodeId = u32;

/// A passable grid cell. Its neighbour list is finalized when the owning
/// [`Grid`] finishes loading and is immutable thereafter.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub pos: Pos,
    /// Up to four neighbour node ids, in the fixed order `(+y, -x, -y, +x)`.
    pub neighbors: Vec<NodeId>,
}

/// The static weighted graph. Obstacle cells have no [`Node`]; the slot in
/// `nodes` is `None`.
#[derive(Debug, Clone)]
pub struct Grid {
    height: u32,
    width: u32,
    channels: u32,
    nodes: Vec<Option<Node>>,
    weights: Vec<f32>,
}

impl Grid {
    /// Build a `Grid` from a parsed [`GridMap`] and, optionally, companion
    /// weights text. When `weights_text` is `None`, every edge to a present
    /// neighbour defaults to weight `1.0`; [`Grid::to_weights_text`] can
    /// then re-materialize that table for the caller to persist.
    pub fn from_parts(map: &GridMap, weights_text: Option<&str>) -> Result<Self, GridError> {
        let (width, height) = (map.width(), map.height());
        let mut nodes: Vec<Option<Node>> = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                if map.is_passable(x, y) {
                    nodes.push(Some(Node {
                        id: y * width + x,
                        pos: Pos::new(x as i32, y as i32),
                        neighbors: Vec::with_capacity(4),
                    }));
                } else {
                    nodes.push(None);
                }
            }
        }

        let exists = |nodes: &[Option<Node>], x: i32, y: i32| -> bool {
            x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height && {
                let id = (y as u32 * width + x as u32) as usize;
                nodes[id].is_some()
            }
        };

        // Fixed enumeration order: (+y, -x, -y, +x). Observable: it seeds
        // A* expansion order and thus matters for reproducibility.
        for y in 0..height {
            for x in 0..width {
                if !exists(&nodes, x as i32, y as i32) {
                    continue;
                }
                let mut neighbor_ids = Vec::with_capacity(4);
                for (dx, dy) in [(0, 1), (-1, 0), (0, -1), (1, 0)] {
                    let (nx, ny) = (x as i32 + dx, y as i32 + dy);
                    if exists(&nodes, nx, ny) {
                        neighbor_ids.push(ny as u32 * width + nx as u32);
                    }
                }
                let id = (y * width + x) as usize;
                nodes[id].as_mut().unwrap().neighbors = neighbor_ids;
            }
        }

        let (channels, weights) = match weights_text {
            Some(text) => {
                let table = WeightsTable::parse(text, width, height)?;
                (CHANNELS, Self::flatten(&table, width, height))
            }
            None => {
                let mut weights = vec![MAX_WEIGHT; (width * height * CHANNELS) as usize];
                for y in 0..height {
                    for x in 0..width {
                        if !exists(&nodes, x as i32, y as i32) {
                            continue;
                        }
                        let cell = |ch: u32| ((y * width + x) * CHANNELS + ch) as usize;
                        for (ch, (dx, dy)) in [(0, 1), (-1, 0), (0, -1), (1, 0)].into_iter().enumerate() {
                            if exists(&nodes, x as i32 + dx, y as i32 + dy) {
                                weights[cell(ch as u32)] = 1.0;
                            }
                        }
                    }
                }
                (CHANNELS, weights)
            }
        };

        debug!(target: "mapf_pibt::grid", width, height, channels, "built grid");
        Ok(Self {
            height,
            width,
            channels,
            nodes,
            weights,
        })
    }

    fn flatten(table: &WeightsTable, width: u32, height: u32) -> Vec<f32> {
        let mut out = vec![MAX_WEIGHT; (width * height * CHANNELS) as usize];
        for y in 0..height {
            for x in 0..width {
                for ch in 0..CHANNELS {
                    let idx = ((y * width + x) * CHANNELS + ch) as usize;
                    out[idx] = table.get(x, y, ch);
                }
            }
        }
        out
    }

    /// Re-materialize the current weight table in the `.weights` text
    /// format, skipping obstacle cells, for the caller to persist.
    pub fn to_weights_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("height {}\n", self.height));
        out.push_str(&format!("width {}\n", self.width));
        out.push_str(&format!("channels {}\n", CHANNELS));
        for y in 0..self.height {
            for x in 0..self.width {
                if !self.exists_xy(x as i32, y as i32) {
                    continue;
                }
                out.push_str(&format!("{x} {y}"));
                for ch in 0..CHANNELS {
                    let w = self.weights[((y * self.width + x) * CHANNELS + ch) as usize];
                    if w >= MAX_WEIGHT {
                        out.push_str(" -1");
                    } else {
                        out.push_str(&format!(" {w}"));
                    }
                }
                out.push('\n');
            }
        }
        out
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn size(&self) -> usize {
        (self.height * self.width) as usize
    }

    pub fn exists(&self, id: NodeId) -> bool {
        (id as usize) < self.nodes.len() && self.nodes[id as usize].is_some()
    }

    pub fn exists_xy(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height && self.exists(y as u32 * self.width + x as u32)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes[id as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("node {id} does not exist"))
    }

    pub fn node_at(&self, x: i32, y: i32) -> Option<NodeId> {
        if self.exists_xy(x, y) {
            Some(y as u32 * self.width + x as u32)
        } else {
            None
        }
    }

    pub fn pos(&self, id: NodeId) -> Pos {
        self.node(id).pos
    }

    pub fn is_neighbor(&self, u: NodeId, v: NodeId) -> bool {
        self.node(u).neighbors.contains(&v)
    }

    /// Outgoing weight of `u` toward the spatial neighbour in direction
    /// `ch`.
    pub fn weight_in_channel(&self, u: NodeId, ch: u32) -> f32 {
        assert_eq!(self.channels, CHANNELS, "grid has no weights loaded");
        self.weights[(u as usize) * (CHANNELS as usize) + ch as usize]
    }

    /// Outgoing weight of the directed edge `u -> v`. Panics (invariant
    /// violation) if `v` is not a spatial neighbour of `u`.
    pub fn get_weight(&self, u: NodeId, v: NodeId) -> f32 {
        let up = self.pos(u);
        let vp = self.pos(v);
        for ch in 0..4u32 {
            if up + Orientation::from_index(ch).unit() == vp {
                return self.weight_in_channel(u, ch);
            }
        }
        panic!("nodes {u} and {v} are not neighbors");
    }

    /// The orientation channel pointing from `u` toward its spatial
    /// neighbour `v`. Panics (invariant violation) if `v` is not a spatial
    /// neighbour of `u` — the planner only ever asks this of a move it
    /// itself just proposed.
    pub fn direction_to(&self, u: NodeId, v: NodeId) -> Orientation {
        let up = self.pos(u);
        let vp = self.pos(v);
        for o in Orientation::ALL {
            if up + o.unit() == vp {
                return o;
            }
        }
        panic!("agent intent to make an invalid move: {u} -> {v}");
    }

    /// Up to four successors of `s`. Unoriented states emit every spatial
    /// neighbour (orientation `None`); oriented states emit a forward move
    /// (if the cell exists) and the two in-place turns, in that fixed
    /// order.
    pub fn get_neighbors(&self, s: State) -> Vec<State> {
        let node = s.node.expect("get_neighbors requires a live state");
        match s.orientation {
            None => self
                .node(node)
                .neighbors
                .iter()
                .map(|&n| State::unoriented(n))
                .collect(),
            Some(o) => {
                let mut out = Vec::with_capacity(3);
                let forward = self.pos(node) + o.unit();
                if let Some(n) = self.node_at(forward.x, forward.y) {
                    out.push(State::new(n, o));
                }
                out.push(State::new(node, o.turn_left()));
                out.push(State::new(node, o.turn_right()));
                out
            }
        }
    }

    /// Weighted shortest path in the composite (node × orientation) space.
    /// Turning in place costs `1.0`; a forward move costs the directed edge
    /// weight, with moves into weight `>= MAX_WEIGHT` pruned. Ties on `f`
    /// prefer the deeper node (larger `g`). When `rng` is supplied,
    /// same-tier successors are shuffled before insertion, randomizing
    /// among equal-cost paths deterministically given the RNG.
    pub fn get_path_with_cost<R: Rng + ?Sized>(
        &self,
        s: State,
        g: State,
        mut rng: Option<&mut R>,
        prohibited: &HashSet<NodeId>,
    ) -> (Vec<State>, f32) {
        if s == g {
            return (Vec::new(), 0.0);
        }

        #[derive(Clone, Copy)]
        struct AStarNode {
            state: State,
            g: f32,
            f: f32,
            parent: i64,
        }

        struct HeapEntry {
            idx: usize,
            f: f32,
            g: f32,
        }
        impl PartialEq for HeapEntry {
            fn eq(&self, other: &Self) -> bool {
                self.f == other.f && self.g == other.g
            }
        }
        impl Eq for HeapEntry {}
        impl PartialOrd for HeapEntry {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for HeapEntry {
            fn cmp(&self, other: &Self) -> Ordering {
                // BinaryHeap is a max-heap; reverse f (prefer smaller f),
                // then prefer the larger g on ties (deeper node first).
                other
                    .f
                    .partial_cmp(&self.f)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| self.g.partial_cmp(&other.g).unwrap_or(Ordering::Equal))
            }
        }

        let goal_pos = self.pos(g.node.expect("get_path_with_cost requires a live goal"));
        let heuristic = |n: NodeId| self.pos(n).manhattan(&goal_pos) as f32;

        let mut pool: Vec<AStarNode> = Vec::new();
        let mut open: BinaryHeap<HeapEntry> = BinaryHeap::new();
        let mut closed: HashSet<(NodeId, Option<Orientation>)> = HashSet::new();

        pool.push(AStarNode {
            state: s,
            g: 0.0,
            f: heuristic(s.node.expect("get_path_with_cost requires a live start")),
            parent: -1,
        });
        open.push(HeapEntry { idx: 0, f: pool[0].f, g: pool[0].g });

        let mut last: i64 = -1;
        while let Some(entry) = open.pop() {
            let curr = pool[entry.idx];
            let key = (curr.state.node.unwrap(), curr.state.orientation);
            if closed.contains(&key) {
                continue;
            }
            closed.insert(key);

            if curr.state == g {
                last = entry.idx as i64;
                break;
            }

            let mut successors = self.get_neighbors(curr.state);
            if let Some(r) = rng.as_deref_mut() {
                successors.shuffle(r);
            }
            for next in successors {
                let next_key = (next.node.unwrap(), next.orientation);
                if closed.contains(&next_key) {
                    continue;
                }
                if prohibited.contains(&next.node.unwrap()) {
                    continue;
                }
                let w = if curr.state.orientation == next.orientation {
                    self.get_weight(curr.state.node.unwrap(), next.node.unwrap())
                } else {
                    1.0
                };
                if w >= MAX_WEIGHT {
                    continue;
                }
                let gcost = curr.g + w;
                let fcost = gcost + heuristic(next.node.unwrap());
                pool.push(AStarNode {
                    state: next,
                    g: gcost,
                    f: fcost,
                    parent: entry.idx as i64,
                });
                open.push(HeapEntry {
                    idx: pool.len() - 1,
                    f: fcost,
                    g: gcost,
                });
            }
        }

        if last == -1 {
            return (Vec::new(), 0.0);
        }
        let cost = pool[last as usize].g;
        let mut path = Vec::new();
        let mut i = last;
        while i != -1 {
            let n = pool[i as usize];
            path.push(n.state);
            i = n.parent;
        }
        path.reverse();
        (path, cost)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// An open 3x3 grid with uniform unit weights, used by unit tests
    /// across this crate that need a small concrete `Grid`.
    pub fn open_3x3() -> Grid {
        let map = GridMap::parse("height 3\nwidth 3\nmap\n...\n...\n...\n").unwrap();
        Grid::from_parts(&map, None).unwrap()
    }
}
