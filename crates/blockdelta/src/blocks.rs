//! The per-block reader/writer table and edge construction from it.
//!
//! The file-diff layer records, for every disk block of the partition, which vertex reads
//! it and which vertex writes it. [`create_edges`] then turns that flat table into
//! dependency edges: the writer must not clobber a block until its reader has consumed
//! it, so the reader has to execute first, encoded as an edge `writer -> reader`.

use blockdelta_graphlib::graph::{self, Graph, InstallOperation, VertexIndex};

use crate::error::{Error, Result};

/// Reader/writer claims for one disk block. At most one of each; a second claim on
/// either side is a fatal modeling error (two file-level operations own one block).
#[derive(Debug, Clone, Copy, Default)]
pub struct Block {
    pub reader: Option<VertexIndex>,
    pub writer: Option<VertexIndex>,
}

/// Records `vertex` as the reader of every source block and the writer of every
/// destination block of `op`. Sparse-hole extents are skipped; they are backed by no
/// real block.
///
/// # Panics
///
/// Panics if any block is already claimed in the same role by another vertex.
pub fn add_install_op_to_blocks_vector(
    op: &InstallOperation,
    graph: &Graph,
    vertex: VertexIndex,
    blocks: &mut [Block],
) -> Result<()> {
    if op.dst_extents.is_empty() {
        return Err(Error::MissingDstExtents {
            file_name: graph[vertex].file_name.clone(),
        });
    }

    for (extents, is_reader) in [(&op.src_extents, true), (&op.dst_extents, false)] {
        let role = if is_reader { "read" } else { "written" };
        for extent in extents {
            if extent.is_sparse() {
                continue;
            }
            for block in extent.start_block..extent.end_block() {
                let cell = &mut blocks[block as usize];
                let claim = if is_reader {
                    &mut cell.reader
                } else {
                    &mut cell.writer
                };
                if let Some(existing) = *claim {
                    panic!(
                        "block {block} is already {role} by vertex {existing} ({:?}) \
                         while adding vertex {vertex} ({:?})",
                        graph[existing].file_name, graph[vertex].file_name
                    );
                }
                *claim = Some(vertex);
            }
        }
    }
    Ok(())
}

/// Builds dependency edges from the blocks table: every block with a recorded reader and
/// a distinct recorded writer extends the edge `writer -> reader` by that block.
pub fn create_edges(graph: &mut Graph, blocks: &[Block]) {
    let mut edge_blocks: u64 = 0;
    for (i, block) in blocks.iter().enumerate() {
        let (Some(reader), Some(writer)) = (block.reader, block.writer) else {
            continue;
        };
        // A vertex never depends on itself.
        if reader == writer {
            continue;
        }
        graph::add_read_before_dep(&mut graph[writer], reader, i as u64);
        edge_blocks += 1;
    }
    tracing::debug!(edge_blocks, "created dependency edges from blocks table");
}
