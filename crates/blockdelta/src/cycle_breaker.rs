//! Break dependency cycles by choosing a set of edges to cut.
//!
//! This is a variant of Johnson's elementary-circuit algorithm: the outer loop walks
//! vertices in index order over a shrinking working copy of the graph, Tarjan picks out
//! the strongly connected component containing the current vertex, and a DFS enumerates
//! circuits through it. Each circuit found gets its cheapest edge (by read-dependency
//! block count, among a small prefix of the path) added to the cut set.
//!
//! Real-world delta graphs can contain astronomically many elementary circuits, so the
//! search deliberately prunes: exploration below a found circuit stops once the depth
//! exceeds [`MAX_EDGES_TO_CONSIDER`] or the current path already crosses a cut edge.
//! That sacrifices completeness of the enumeration, never correctness — a circuit the
//! search skips is either already broken or found again from another starting vertex.

use std::collections::BTreeSet;

use blockdelta_graphlib::graph::{self, Edge, Graph, VertexIndex, alg};
use rustc_hash::FxHashSet as HashSet;

/// How many leading path edges a circuit's cut selection looks at, and how deep sibling
/// exploration continues after a found circuit. A tunable performance/quality trade-off,
/// not a semantic requirement.
pub const MAX_EDGES_TO_CONSIDER: usize = 2;

#[derive(Debug, Default)]
pub struct CycleBreaker {
    subgraph: Graph,
    cut_edges: BTreeSet<Edge>,
    stack: Vec<VertexIndex>,
    blocked: Vec<bool>,
    // blocked_graph[u] holds the vertices to unblock when u unblocks (Johnson's B sets).
    blocked_graph: Vec<HashSet<VertexIndex>>,
    current_vertex: Option<VertexIndex>,
    skipped_ops: usize,
}

struct Frame {
    vertex: VertexIndex,
    edges: Vec<VertexIndex>,
    next: usize,
    found: bool,
}

impl CycleBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full operations the outer loop skipped. They write payload data and read nothing,
    /// so they can never sit on a cycle; the counter exists for diagnostics only.
    pub fn skipped_ops(&self) -> usize {
        self.skipped_ops
    }

    /// Returns a set of edges whose removal leaves `graph` free of directed cycles among
    /// non-full operations. Edges are not removed here; that is `cut_edges`'s job.
    pub fn break_cycles(&mut self, graph: &Graph) -> BTreeSet<Edge> {
        self.cut_edges.clear();
        self.skipped_ops = 0;
        // Working copy; the outer loop removes one vertex per iteration so that each
        // round sees the subgraph induced by {i, i+1, ..., n}.
        self.subgraph = graph.clone();
        let n = self.subgraph.len();

        for i in 0..n {
            let idx = VertexIndex(i);
            if graph[idx].op.kind.is_full() {
                self.skipped_ops += 1;
                continue;
            }

            if i > 0 {
                let prev = VertexIndex(i - 1);
                self.subgraph[prev].out_edges.clear();
                for j in i..n {
                    self.subgraph[VertexIndex(j)].out_edges.remove(&prev);
                }
            }

            let component = alg::strongly_connected_component(&self.subgraph, idx);
            if component.len() == 1 && !self.subgraph[idx].out_edges.contains_key(&idx) {
                continue;
            }

            // Restrict the circuit search to edges strictly within the component.
            let members: HashSet<VertexIndex> = component.iter().copied().collect();
            for &v in &component {
                let edges: BTreeSet<VertexIndex> = self.subgraph[v]
                    .out_edges
                    .keys()
                    .filter(|w| members.contains(w))
                    .copied()
                    .collect();
                self.subgraph[v].subgraph_edges = edges;
            }

            self.current_vertex = Some(idx);
            self.blocked.clear();
            self.blocked.resize(n, false);
            self.blocked_graph.clear();
            self.blocked_graph.resize(n, HashSet::default());
            self.search_circuits();
        }

        assert!(
            self.stack.is_empty(),
            "circuit stack must be empty once the search completes"
        );
        tracing::debug!(
            cut_edges = self.cut_edges.len(),
            skipped_ops = self.skipped_ops,
            "cycle breaking complete"
        );
        std::mem::take(&mut self.cut_edges)
    }

    /// Johnson's `CIRCUIT(v)` DFS from the current vertex, with an explicit frame stack
    /// instead of recursion (component sizes track image size).
    fn search_circuits(&mut self) {
        let root = self
            .current_vertex
            .expect("search_circuits needs a current vertex");
        let mut frames: Vec<Frame> = vec![self.enter(root)];

        while !frames.is_empty() {
            let frame = frames.last_mut().expect("frame stack is non-empty");
            if frame.next < frame.edges.len() {
                let w = frame.edges[frame.next];
                frame.next += 1;
                if w == root {
                    // The path stack plus the root closes a circuit.
                    self.handle_circuit();
                    frames.last_mut().expect("frame stack is non-empty").found = true;
                } else if !self.blocked[w.0] {
                    let child = self.enter(w);
                    frames.push(child);
                }
                continue;
            }

            let frame = frames.pop().expect("frame stack is non-empty");
            if frame.found {
                self.unblock(frame.vertex);
            } else {
                // No circuit through this vertex yet: park it on the blocked graph so a
                // future unblock of any successor revisits it.
                for &w in &frame.edges {
                    self.blocked_graph[w.0].insert(frame.vertex);
                }
            }
            debug_assert_eq!(self.stack.last(), Some(&frame.vertex));
            self.stack.pop();

            if frame.found {
                let crosses_cut = self.stack_contains_cut_edge();
                let parent_depth = frames.len().saturating_sub(1);
                if let Some(parent) = frames.last_mut() {
                    parent.found = true;
                    // Pruning: below this depth, or across an already-cut edge, further
                    // siblings would only rediscover broken circuits.
                    if parent_depth > MAX_EDGES_TO_CONSIDER || crosses_cut {
                        parent.next = parent.edges.len();
                    }
                }
            }
        }
    }

    fn enter(&mut self, vertex: VertexIndex) -> Frame {
        self.stack.push(vertex);
        self.blocked[vertex.0] = true;
        Frame {
            vertex,
            edges: self.subgraph[vertex].subgraph_edges.iter().copied().collect(),
            next: 0,
            found: false,
        }
    }

    fn unblock(&mut self, vertex: VertexIndex) {
        let mut work = vec![vertex];
        while let Some(u) = work.pop() {
            self.blocked[u.0] = false;
            for w in std::mem::take(&mut self.blocked_graph[u.0]) {
                if self.blocked[w.0] {
                    work.push(w);
                }
            }
        }
    }

    fn stack_contains_cut_edge(&self) -> bool {
        self.stack
            .windows(2)
            .any(|pair| self.cut_edges.contains(&(pair[0], pair[1])))
    }

    /// The path stack (closed back to the current vertex) describes one elementary
    /// circuit; pick an edge to cut.
    fn handle_circuit(&mut self) {
        let root = self
            .current_vertex
            .expect("handle_circuit needs a current vertex");
        self.stack.push(root);
        assert!(
            self.stack.len() >= 2,
            "a circuit needs at least two path entries"
        );

        // A circuit that crosses an edge we already cut is broken; don't cut it twice.
        if self.stack_contains_cut_edge() {
            self.stack.pop();
            return;
        }

        let mut min_edge = (self.stack[0], self.stack[1]);
        let mut min_weight = u64::MAX;
        for (considered, pair) in self.stack.windows(2).enumerate() {
            if considered == MAX_EDGES_TO_CONSIDER {
                break;
            }
            let edge = (pair[0], pair[1]);
            let weight = graph::edge_weight(&self.subgraph, edge);
            if weight < min_weight {
                min_weight = weight;
                min_edge = edge;
            }
        }
        tracing::trace!(
            from = min_edge.0.0,
            to = min_edge.1.0,
            weight = min_weight,
            "cutting circuit edge"
        );
        self.cut_edges.insert(min_edge);
        self.stack.pop();
    }
}
