//! End-to-end conversion of a dependency graph into an executable operation order.

use serde::Serialize;

use blockdelta_graphlib::graph::{Graph, InstallOperation, Vertex, VertexIndex};

use crate::cut_edges::cut_edges;
use crate::cycle_breaker::CycleBreaker;
use crate::error::Result;
use crate::order::{
    generate_reverse_topo_order_map, move_full_ops_to_back, sort_cuts_by_topo_order,
    topological_sort,
};
use crate::scratch::{assign_temp_blocks, no_temp_blocks_remain};

/// Produces full (REPLACE / REPLACE_BZ) install operations for vertices that can no
/// longer be expressed as in-place moves or diffs.
pub trait OperationRegenerator {
    /// Builds a full operation covering `vertex`'s destination extents from new-image
    /// data. The returned operation must have a full kind.
    fn regenerate_full_operation(&mut self, vertex: &Vertex) -> Result<InstallOperation>;
}

/// Counters describing what the conversion did to the graph.
#[derive(Debug, Clone, Serialize)]
pub struct DagSummary {
    /// Vertices in the final graph, synthetic copies included.
    pub vertices: usize,
    /// Scratch-copy vertices added by the cut pass (invalidated ones included).
    pub synthetic_vertices: usize,
    /// Edges removed to break cycles.
    pub cut_edges: usize,
    /// Full operations the cycle breaker never had to consider.
    pub skipped_full_ops: usize,
    /// Cut groups demoted to full operations for lack of scratch.
    pub demoted_cut_groups: usize,
}

impl DagSummary {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The execution order plus conversion counters.
#[derive(Debug, Clone)]
pub struct DagResult {
    /// Valid vertices in dependency-respecting execution order.
    pub order: Vec<VertexIndex>,
    pub summary: DagSummary,
}

/// Converts `graph` into a DAG and returns an execution order honoring every
/// remaining dependency.
///
/// Steps: break cycles, reroute the cut edges through scratch copies, topologically
/// sort, push full operations to the back, then resolve every placeholder scratch
/// address to real blocks (demoting to full operations where real scratch ran out).
///
/// Panics if any placeholder address survives, since executing one would write outside
/// the image.
pub fn convert_graph_to_dag(
    graph: &mut Graph,
    regenerator: &mut dyn OperationRegenerator,
) -> Result<DagResult> {
    let initial_vertices = graph.len();

    let mut breaker = CycleBreaker::new();
    let cut_set = breaker.break_cycles(graph);
    let cut_edge_count = cut_set.len();
    let mut cuts = cut_edges(graph, &cut_set);

    let mut op_indexes = topological_sort(graph);
    move_full_ops_to_back(graph, &mut op_indexes);

    let mut reverse_op_indexes = Vec::new();
    generate_reverse_topo_order_map(&op_indexes, &mut reverse_op_indexes);
    sort_cuts_by_topo_order(&op_indexes, &mut cuts);

    let mut demoted_cut_groups = 0;
    if !cuts.is_empty() {
        demoted_cut_groups = assign_temp_blocks(
            graph,
            regenerator,
            &mut op_indexes,
            &mut reverse_op_indexes,
            &cuts,
        )?;
    }
    assert!(
        no_temp_blocks_remain(graph),
        "placeholder scratch blocks survived DAG conversion"
    );

    op_indexes.retain(|&vertex| graph[vertex].valid);

    let summary = DagSummary {
        vertices: graph.len(),
        synthetic_vertices: graph.len() - initial_vertices,
        cut_edges: cut_edge_count,
        skipped_full_ops: breaker.skipped_ops(),
        demoted_cut_groups,
    };
    tracing::debug!(summary = %summary.to_json(), "graph converted to DAG");

    Ok(DagResult {
        order: op_indexes,
        summary,
    })
}
