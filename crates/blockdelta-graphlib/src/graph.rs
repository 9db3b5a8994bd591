//! The install-operation dependency graph.
//!
//! Vertices live in a dense, grow-only arena and reference each other only by
//! [`VertexIndex`], so appending synthetic vertices (cycle-cut copies) never invalidates
//! existing edges. An edge `A -> B` means "B must complete before A": A reads blocks that
//! B is about to overwrite, or A's scratch write depends on B vacating blocks.

use rustc_hash::FxBuildHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Index, IndexMut};

use crate::extent::{Extent, compress_extents, expand_extents};

type HashMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;

pub mod alg;

/// Dense arena index of a vertex. "No vertex" is expressed as `Option<VertexIndex>`,
/// never as a sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexIndex(pub usize);

impl fmt::Display for VertexIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directed edge as an ordered vertex-index pair `(from, to)`.
pub type Edge = (VertexIndex, VertexIndex);

/// The kind of install operation a vertex performs.
///
/// `Replace`/`ReplaceBz` write payload data and read nothing from the old image, so they
/// can never sit on a dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationKind {
    Replace,
    ReplaceBz,
    #[default]
    Move,
    Bsdiff,
}

impl OperationKind {
    /// Full operations are those sourced entirely from payload data.
    pub fn is_full(self) -> bool {
        matches!(self, OperationKind::Replace | OperationKind::ReplaceBz)
    }
}

/// One install operation: where it reads, where it writes, and where its payload data
/// (if any) lives in the blob being assembled.
#[derive(Debug, Clone, Default)]
pub struct InstallOperation {
    pub kind: OperationKind,
    pub src_extents: Vec<Extent>,
    pub dst_extents: Vec<Extent>,
    pub data_offset: Option<u64>,
    pub data_length: Option<u64>,
}

/// Block sets attached to an edge. `extents` are read dependencies (the source vertex
/// reads these blocks and the target must consume them first); `write_extents` are write
/// dependencies (the target's scratch write must land before the source overwrites them).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeProperties {
    pub extents: Vec<Extent>,
    pub write_extents: Vec<Extent>,
}

/// One vertex of the dependency graph.
///
/// `subgraph_edges` is a working set used transiently during cycle breaking. `valid`
/// starts true; a vertex whose operation is discarded (a cut-fixup copy that got folded
/// away) is marked invalid rather than removed, keeping indices stable.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub op: InstallOperation,
    pub file_name: String,
    pub out_edges: BTreeMap<VertexIndex, EdgeProperties>,
    pub subgraph_edges: BTreeSet<VertexIndex>,
    pub valid: bool,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            op: InstallOperation::default(),
            file_name: String::new(),
            out_edges: BTreeMap::new(),
            subgraph_edges: BTreeSet::new(),
            valid: true,
        }
    }
}

impl Vertex {
    pub fn new(op: InstallOperation, file_name: impl Into<String>) -> Self {
        Self {
            op,
            file_name: file_name.into(),
            ..Self::default()
        }
    }
}

/// Grow-only vertex arena.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    vertices: Vec<Vertex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Appends a vertex and returns its stable index.
    pub fn add_vertex(&mut self, vertex: Vertex) -> VertexIndex {
        let index = VertexIndex(self.vertices.len());
        self.vertices.push(vertex);
        index
    }

    pub fn vertex(&self, index: VertexIndex) -> &Vertex {
        &self.vertices[index.0]
    }

    pub fn vertex_mut(&mut self, index: VertexIndex) -> &mut Vertex {
        &mut self.vertices[index.0]
    }

    pub fn indices(&self) -> impl Iterator<Item = VertexIndex> + use<> {
        (0..self.vertices.len()).map(VertexIndex)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }
}

impl Index<VertexIndex> for Graph {
    type Output = Vertex;

    fn index(&self, index: VertexIndex) -> &Vertex {
        &self.vertices[index.0]
    }
}

impl IndexMut<VertexIndex> for Graph {
    fn index_mut(&mut self, index: VertexIndex) -> &mut Vertex {
        &mut self.vertices[index.0]
    }
}

/// Total read-dependency block count of `edge`. The edge must exist.
pub fn edge_weight(graph: &Graph, edge: Edge) -> u64 {
    graph[edge.0]
        .out_edges
        .get(&edge.1)
        .map(|props| crate::extent::blocks_in_extents(&props.extents))
        .expect("edge_weight queried for a missing edge")
}

/// Adds `block` as a read-before dependency `src -> dst`, extending an existing edge.
pub fn add_read_before_dep(src: &mut Vertex, dst: VertexIndex, block: u64) {
    let props = src.out_edges.entry(dst).or_default();
    crate::extent::append_block_to_extents(&mut props.extents, block);
}

/// Bulk form of [`add_read_before_dep`].
pub fn add_read_before_dep_extents(src: &mut Vertex, dst: VertexIndex, extents: &[Extent]) {
    for extent in extents {
        if extent.is_sparse() {
            continue;
        }
        for block in extent.start_block..extent.end_block() {
            add_read_before_dep(src, dst, block);
        }
    }
}

/// Clears the write-dependency role from every edge in `edge_map`, erasing edges that
/// carried nothing else.
pub fn drop_write_before_deps(edge_map: &mut BTreeMap<VertexIndex, EdgeProperties>) {
    edge_map.retain(|_, props| {
        props.write_extents.clear();
        !props.extents.is_empty()
    });
}

/// Removes every edge pointing at `index` from every other vertex.
pub fn drop_incoming_edges_to(graph: &mut Graph, index: VertexIndex) {
    for i in graph.indices().collect::<Vec<_>>() {
        if i != index {
            graph[i].out_edges.remove(&index);
        }
    }
}

/// Rewrites `vertex`'s source extents block-by-block: wherever it reads a block listed in
/// `remove_extents`, it now reads the corresponding block of `replace_extents` instead.
///
/// Both extent lists are expanded to parallel flat block sequences (they must cover the
/// same number of blocks); sparse holes are opaque placeholders and are never substituted.
/// The same substitution is applied to the `write_extents` of every outgoing edge, since
/// those describe the same physical blocks in a different role.
pub fn substitute_blocks(vertex: &mut Vertex, remove_extents: &[Extent], replace_extents: &[Extent]) {
    let remove_expanded = expand_extents(remove_extents);
    let replace_expanded = expand_extents(replace_extents);
    assert_eq!(
        remove_expanded.len(),
        replace_expanded.len(),
        "substitute_blocks extent lists must cover the same block count"
    );

    let mut conversion: HashMap<u64, u64> = HashMap::default();
    for (&from, &to) in remove_expanded.iter().zip(replace_expanded.iter()) {
        if from == crate::extent::SPARSE_HOLE {
            continue;
        }
        conversion.insert(from, to);
    }

    let mut read_blocks = expand_extents(&vertex.op.src_extents);
    apply_map(&mut read_blocks, &conversion);
    vertex.op.src_extents = compress_extents(&read_blocks);

    for props in vertex.out_edges.values_mut() {
        let mut write_blocks = expand_extents(&props.write_extents);
        apply_map(&mut write_blocks, &conversion);
        props.write_extents = compress_extents(&write_blocks);
    }
}

fn apply_map(blocks: &mut [u64], conversion: &HashMap<u64, u64>) {
    for block in blocks {
        if let Some(&to) = conversion.get(block) {
            *block = to;
        }
    }
}
