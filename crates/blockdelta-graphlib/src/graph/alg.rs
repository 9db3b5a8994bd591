//! Graph algorithms over the vertex arena.

use super::{Graph, VertexIndex};

/// Returns the strongly connected component containing `start`, as an unordered list of
/// vertex indices. A lone vertex is its own component, so the result is never empty.
///
/// Classic Tarjan over `out_edges`, with fresh per-call state. The DFS uses an explicit
/// frame stack: production graphs reach hundreds of thousands of vertices and the
/// recursive form would gamble on thread stack size.
pub fn strongly_connected_component(graph: &Graph, start: VertexIndex) -> Vec<VertexIndex> {
    struct Frame {
        vertex: VertexIndex,
        successors: Vec<VertexIndex>,
        next: usize,
    }

    let n = graph.len();
    let mut next_index: usize = 0;
    let mut indices: Vec<Option<usize>> = vec![None; n];
    let mut lowlink: Vec<usize> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut stack: Vec<VertexIndex> = Vec::new();
    let mut result: Vec<VertexIndex> = Vec::new();

    let push_frame = |v: VertexIndex,
                      next_index: &mut usize,
                      indices: &mut Vec<Option<usize>>,
                      lowlink: &mut Vec<usize>,
                      on_stack: &mut Vec<bool>,
                      stack: &mut Vec<VertexIndex>| {
        indices[v.0] = Some(*next_index);
        lowlink[v.0] = *next_index;
        *next_index += 1;
        stack.push(v);
        on_stack[v.0] = true;
        Frame {
            vertex: v,
            successors: graph[v].out_edges.keys().copied().collect(),
            next: 0,
        }
    };

    let mut frames: Vec<Frame> = vec![push_frame(
        start,
        &mut next_index,
        &mut indices,
        &mut lowlink,
        &mut on_stack,
        &mut stack,
    )];

    while let Some(frame) = frames.last_mut() {
        if frame.next < frame.successors.len() {
            let w = frame.successors[frame.next];
            frame.next += 1;
            match indices[w.0] {
                None => {
                    let child = push_frame(
                        w,
                        &mut next_index,
                        &mut indices,
                        &mut lowlink,
                        &mut on_stack,
                        &mut stack,
                    );
                    frames.push(child);
                }
                Some(w_index) => {
                    if on_stack[w.0] {
                        let v = frame.vertex;
                        lowlink[v.0] = lowlink[v.0].min(w_index);
                    }
                }
            }
            continue;
        }

        let v = frame.vertex;
        if lowlink[v.0] == indices[v.0].unwrap_or(usize::MAX) {
            let mut component: Vec<VertexIndex> = Vec::new();
            loop {
                let w = stack.pop().expect("tarjan stack underflow");
                on_stack[w.0] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            // Only the component containing the start vertex is of interest; the others
            // found along the way are discarded.
            if component.contains(&start) {
                result = component;
            }
        }
        frames.pop();
        if let Some(parent) = frames.last_mut() {
            lowlink[parent.vertex.0] = lowlink[parent.vertex.0].min(lowlink[v.0]);
        }
    }

    debug_assert!(!result.is_empty());
    result
}
