//! Graph container and block-extent primitives used by `blockdelta`.
//!
//! Install operations live in a dense, grow-only arena (`graph::Graph`) and refer to each
//! other purely by integer index, so appending synthetic vertices never invalidates edges.
//! Block ranges are modeled as [`Extent`]s and set arithmetic over them as [`ExtentRanges`].

pub mod extent;
pub mod extent_ranges;
pub mod graph;

pub use extent::{Extent, SPARSE_HOLE, TEMP_BLOCK_START};
pub use extent_ranges::ExtentRanges;
pub use graph::{
    Edge, EdgeProperties, Graph, InstallOperation, OperationKind, Vertex, VertexIndex,
};
