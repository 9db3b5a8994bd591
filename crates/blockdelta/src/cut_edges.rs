//! Rewrite the graph so the chosen cut edges disappear, preserving every data movement.
//!
//! Each cut edge `src -> dst` gets a synthetic MOVE vertex that copies the contested
//! blocks to scratch before `src` overwrites them; `dst` is rewritten to read the scratch
//! copy instead. The scratch addresses handed out here are placeholders from the temp
//! range; `scratch::assign_temp_blocks` later resolves them to real blocks or demotes the
//! operation.

use std::collections::BTreeSet;

use blockdelta_graphlib::extent::{Extent, TEMP_BLOCK_START, blocks_in_extents, extent_for_range};
use blockdelta_graphlib::graph::{
    self, Edge, EdgeProperties, Graph, InstallOperation, OperationKind, Vertex, VertexIndex,
};

/// Record of one cut: the synthetic copy vertex, the endpoints of the edge it replaced,
/// and the placeholder scratch extents it writes.
#[derive(Debug, Clone)]
pub struct CutEdgeVertexes {
    pub new_vertex: VertexIndex,
    pub old_src: VertexIndex,
    pub old_dst: VertexIndex,
    pub tmp_extents: Vec<Extent>,
}

/// Hands out monotonically increasing placeholder addresses from the temp-block range.
/// These are not real disk blocks and must all be resolved before the payload is
/// finalized.
#[derive(Debug)]
pub struct DummyExtentAllocator {
    next_block: u64,
}

impl Default for DummyExtentAllocator {
    fn default() -> Self {
        Self {
            next_block: TEMP_BLOCK_START,
        }
    }
}

impl DummyExtentAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, block_count: u64) -> Vec<Extent> {
        let extent = extent_for_range(self.next_block, block_count);
        self.next_block += block_count;
        vec![extent]
    }
}

/// Cuts every edge in `edges`, appending one MOVE vertex per cut. Returns the cut
/// records in the set's (deterministic) iteration order.
pub fn cut_edges(graph: &mut Graph, edges: &BTreeSet<Edge>) -> Vec<CutEdgeVertexes> {
    let mut allocator = DummyExtentAllocator::new();
    let mut cuts: Vec<CutEdgeVertexes> = Vec::with_capacity(edges.len());

    for &(src, dst) in edges {
        let props = graph[src]
            .out_edges
            .get(&dst)
            .cloned()
            .expect("cut edge must exist in the graph");
        assert!(
            !props.extents.is_empty(),
            "cut edge {src} -> {dst} carries no read dependency"
        );

        let weight = blocks_in_extents(&props.extents);
        let tmp_extents = allocator.allocate(weight);

        // Copy the contested blocks to scratch.
        let new_vertex = graph.add_vertex(Vertex::new(
            InstallOperation {
                kind: OperationKind::Move,
                src_extents: props.extents.clone(),
                dst_extents: tmp_extents.clone(),
                ..Default::default()
            },
            format!("<cut {src}->{dst}>"),
        ));

        // src must wait for the copy before clobbering the originals.
        graph[src].out_edges.insert(new_vertex, props.clone());

        // dst reads the scratch copy instead of the originals.
        graph::substitute_blocks(&mut graph[dst], &props.extents, &tmp_extents);

        let removed = graph[src].out_edges.remove(&dst);
        debug_assert!(removed.is_some());

        // The scratch write has to land before dst overwrites the original blocks.
        graph[dst].out_edges.insert(
            new_vertex,
            EdgeProperties {
                extents: Vec::new(),
                write_extents: tmp_extents.clone(),
            },
        );

        cuts.push(CutEdgeVertexes {
            new_vertex,
            old_src: src,
            old_dst: dst,
            tmp_extents,
        });
    }

    tracing::debug!(cuts = cuts.len(), "cut edges rewired through scratch copies");
    cuts
}
