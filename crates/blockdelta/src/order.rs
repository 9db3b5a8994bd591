//! Operation ordering: topological sort over the dependency graph plus the
//! reorderings the scratch allocator relies on.

use blockdelta_graphlib::graph::{Graph, VertexIndex};

use crate::cut_edges::CutEdgeVertexes;

/// Post-order DFS over every vertex. Because an edge `a -> b` means `b` must complete
/// before `a`, the post-order itself is the execution order (no reversal needed).
///
/// Iterative so pathological graphs (long dependency chains) cannot overflow the
/// thread stack.
pub fn topological_sort(graph: &Graph) -> Vec<VertexIndex> {
    struct Frame {
        vertex: VertexIndex,
        successors: Vec<VertexIndex>,
        next: usize,
    }

    let mut visited = vec![false; graph.len()];
    let mut order: Vec<VertexIndex> = Vec::with_capacity(graph.len());
    let mut frames: Vec<Frame> = Vec::new();

    for root in graph.indices() {
        if visited[root.0] {
            continue;
        }
        visited[root.0] = true;
        frames.push(Frame {
            vertex: root,
            successors: graph[root].out_edges.keys().copied().collect(),
            next: 0,
        });
        while let Some(frame) = frames.last_mut() {
            if frame.next < frame.successors.len() {
                let succ = frame.successors[frame.next];
                frame.next += 1;
                if !visited[succ.0] {
                    visited[succ.0] = true;
                    frames.push(Frame {
                        vertex: succ,
                        successors: graph[succ].out_edges.keys().copied().collect(),
                        next: 0,
                    });
                }
            } else {
                order.push(frame.vertex);
                frames.pop();
            }
        }
    }
    order
}

/// Stable-partitions `order` so every full operation (REPLACE / REPLACE_BZ) executes
/// last. Full operations read nothing from the old image, so pushing them back frees
/// their destination blocks for use as scratch by earlier operations.
pub fn move_full_ops_to_back(graph: &Graph, order: &mut Vec<VertexIndex>) {
    let mut ret: Vec<VertexIndex> = Vec::with_capacity(order.len());
    let mut full_ops: Vec<VertexIndex> = Vec::new();
    for &vertex in order.iter() {
        if graph[vertex].op.kind.is_full() {
            full_ops.push(vertex);
        } else {
            ret.push(vertex);
        }
    }
    tracing::debug!(
        full_ops = full_ops.len(),
        total = order.len(),
        "moved full operations to the back of the order"
    );
    ret.append(&mut full_ops);
    *order = ret;
}

/// Builds the inverse of `order`: `table[v] == i` iff `order[i] == v`. Entries for
/// vertices absent from `order` are left untouched (or `usize::MAX` when fresh).
pub fn generate_reverse_topo_order_map(order: &[VertexIndex], table: &mut Vec<usize>) {
    let needed = order.iter().map(|v| v.0 + 1).max().unwrap_or(0);
    if table.len() < needed {
        table.resize(needed, usize::MAX);
    }
    for (position, &vertex) in order.iter().enumerate() {
        table[vertex.0] = position;
    }
}

/// Sorts the cut records by the topological position of their consumer (`old_dst`),
/// so the scratch allocator can walk them from the end of the install backwards.
pub fn sort_cuts_by_topo_order(order: &[VertexIndex], cuts: &mut [CutEdgeVertexes]) {
    let mut table = Vec::new();
    generate_reverse_topo_order_map(order, &mut table);
    cuts.sort_by_key(|cut| table[cut.old_dst.0]);
}
