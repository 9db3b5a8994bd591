//! Resolves placeholder scratch addresses to real blocks.
//!
//! The cut pass hands out addresses from the temp range because no real blocks are
//! known to be free at that point. This pass walks the cuts from the end of the install
//! backwards and, for each consumer, borrows destination blocks from operations that
//! run later in the order (those blocks have not been written yet, so they are free).
//! When not enough scratch exists, the consumer is demoted to a full operation and the
//! copy vertex is discarded.

use blockdelta_graphlib::extent::{
    Extent, SPARSE_HOLE, TEMP_BLOCK_START, blocks_in_extents, extent_for_range,
};
use blockdelta_graphlib::extent_ranges::ExtentRanges;
use blockdelta_graphlib::graph::{self, Graph, VertexIndex};

use crate::cut_edges::CutEdgeVertexes;
use crate::error::Result;
use crate::order::{generate_reverse_topo_order_map, move_full_ops_to_back};
use crate::pipeline::OperationRegenerator;

/// Assigns real blocks to every cut's placeholder extents. `cuts` must be sorted by
/// the consumer's topological position; groups sharing a consumer are handled
/// together. Returns the number of cut groups demoted to full operations.
///
/// `op_indexes` and `reverse_op_indexes` are updated in place whenever a demotion
/// changes the op set.
pub fn assign_temp_blocks(
    graph: &mut Graph,
    regenerator: &mut dyn OperationRegenerator,
    op_indexes: &mut Vec<VertexIndex>,
    reverse_op_indexes: &mut Vec<usize>,
    cuts: &[CutEdgeVertexes],
) -> Result<usize> {
    assert!(!cuts.is_empty());

    let mut demoted_groups = 0;
    let mut group: Vec<&CutEdgeVertexes> = Vec::new();
    for cut in cuts.iter().rev() {
        if group
            .first()
            .is_some_and(|first| first.old_dst != cut.old_dst)
        {
            demoted_groups += assign_block_for_adjoining_cuts(
                graph,
                regenerator,
                op_indexes,
                reverse_op_indexes,
                &group,
            )?;
            group.clear();
        }
        group.push(cut);
    }
    demoted_groups +=
        assign_block_for_adjoining_cuts(graph, regenerator, op_indexes, reverse_op_indexes, &group)?;
    Ok(demoted_groups)
}

/// Handles one group of cuts sharing a consumer. Returns 1 if the group was demoted,
/// 0 otherwise.
fn assign_block_for_adjoining_cuts(
    graph: &mut Graph,
    regenerator: &mut dyn OperationRegenerator,
    op_indexes: &mut Vec<VertexIndex>,
    reverse_op_indexes: &mut Vec<usize>,
    cuts: &[&CutEdgeVertexes],
) -> Result<usize> {
    let old_dst = cuts[0].old_dst;
    let cut_block_counts: Vec<u64> = cuts
        .iter()
        .map(|cut| blocks_in_extents(&cut.tmp_extents))
        .collect();
    let blocks_needed: u64 = cut_block_counts.iter().sum();

    // Scan operations after the consumer for destination blocks that nothing earlier
    // reads. Those blocks are untouched until their owner runs, so the consumer may
    // use them as scratch in the meantime.
    let mut scratch_ranges = ExtentRanges::new();
    let mut suppliers: Vec<(VertexIndex, ExtentRanges)> = Vec::new();
    let consumer_position = reverse_op_indexes[old_dst.0];
    for &candidate in &op_indexes[consumer_position + 1..] {
        if !graph[candidate].valid {
            continue;
        }
        let mut ranges = ExtentRanges::new();
        ranges.add_repeated_extents(&graph[candidate].op.dst_extents);
        // Placeholder addresses are not real blocks.
        ranges.subtract_extent(extent_for_range(
            TEMP_BLOCK_START,
            SPARSE_HOLE - TEMP_BLOCK_START,
        ));
        // Blocks the candidate itself reads, or that its dependents read, are live.
        ranges.subtract_repeated_extents(&graph[candidate].op.src_extents);
        for props in graph[candidate].out_edges.values() {
            ranges.subtract_repeated_extents(&props.extents);
        }
        if ranges.blocks() == 0 {
            continue;
        }
        if scratch_ranges.blocks() + ranges.blocks() > blocks_needed {
            let trimmed = ranges.get_extents_for_block_count(blocks_needed - scratch_ranges.blocks());
            ranges = ExtentRanges::new();
            ranges.add_repeated_extents(&trimmed);
        }
        scratch_ranges.add_ranges(&ranges);
        suppliers.push((candidate, ranges));
        if scratch_ranges.blocks() >= blocks_needed {
            break;
        }
    }

    if scratch_ranges.blocks() < blocks_needed {
        tracing::debug!(
            needed = blocks_needed,
            found = scratch_ranges.blocks(),
            consumer = %old_dst,
            "not enough scratch blocks; demoting cut group to a full operation"
        );
        convert_cuts_to_full_ops(graph, regenerator, cuts)?;
        op_indexes.retain(|&vertex| graph[vertex].valid);
        move_full_ops_to_back(graph, op_indexes);
        generate_reverse_topo_order_map(op_indexes, reverse_op_indexes);
        return Ok(1);
    }
    assert_eq!(scratch_ranges.blocks(), blocks_needed);

    // The consumer must finish with the borrowed blocks before their owners write
    // them, which is exactly a read-before dependency supplier -> consumer.
    for (supplier, ranges) in &suppliers {
        graph::add_read_before_dep_extents(&mut graph[*supplier], old_dst, ranges.extents());
    }

    for (cut, &needed) in cuts.iter().zip(&cut_block_counts) {
        let real_extents = scratch_ranges.get_extents_for_block_count(needed);
        scratch_ranges.subtract_repeated_extents(&real_extents);
        graph::substitute_blocks(&mut graph[cut.old_dst], &cut.tmp_extents, &real_extents);
        graph::substitute_blocks(&mut graph[cut.new_vertex], &cut.tmp_extents, &real_extents);
        // The copy vertex writes the scratch blocks; substitute_blocks only rewrites
        // reads, so repoint its destination explicitly.
        graph[cut.new_vertex].op.dst_extents = real_extents;
    }
    Ok(0)
}

/// Demotes every cut in the group: the shared consumer becomes a full operation and
/// each copy vertex is discarded.
pub fn convert_cuts_to_full_ops(
    graph: &mut Graph,
    regenerator: &mut dyn OperationRegenerator,
    cuts: &[&CutEdgeVertexes],
) -> Result<()> {
    for cut in cuts {
        convert_cut_to_full_op(graph, regenerator, cut)?;
    }
    Ok(())
}

/// Demotes a single cut. Idempotent on the consumer: a vertex already regenerated by
/// an earlier cut in the same group is left alone.
pub fn convert_cut_to_full_op(
    graph: &mut Graph,
    regenerator: &mut dyn OperationRegenerator,
    cut: &CutEdgeVertexes,
) -> Result<()> {
    let old_dst = cut.old_dst;
    if !graph[old_dst].op.kind.is_full() {
        // Read dependencies on the consumer's destination are still real overwrite
        // constraints; pure write-before edges belonged to the scratch plumbing.
        let mut out_edges = graph[old_dst].out_edges.clone();
        graph::drop_write_before_deps(&mut out_edges);

        let op = regenerator.regenerate_full_operation(&graph[old_dst])?;
        debug_assert!(op.kind.is_full());

        let vertex = &mut graph[old_dst];
        vertex.op = op;
        vertex.out_edges = out_edges;

        // A full operation reads nothing from the old image, so nothing needs to
        // complete before it.
        graph::drop_incoming_edges_to(graph, old_dst);
    }

    graph[cut.new_vertex].valid = false;
    graph::drop_incoming_edges_to(graph, cut.new_vertex);
    Ok(())
}

/// True when no placeholder scratch address survives anywhere in the graph. Checked
/// before the order is handed to the payload writer.
pub fn no_temp_blocks_remain(graph: &Graph) -> bool {
    fn extents_clean(extents: &[Extent]) -> bool {
        extents
            .iter()
            .all(|extent| extent.is_sparse() || extent.end_block() <= TEMP_BLOCK_START)
    }

    for index in graph.indices() {
        let vertex = &graph[index];
        if !vertex.valid {
            continue;
        }
        if !extents_clean(&vertex.op.src_extents) || !extents_clean(&vertex.op.dst_extents) {
            return false;
        }
        for props in vertex.out_edges.values() {
            if !extents_clean(&props.extents) || !extents_clean(&props.write_extents) {
                return false;
            }
        }
    }
    true
}
