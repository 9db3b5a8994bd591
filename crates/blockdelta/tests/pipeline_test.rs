use blockdelta::blocks::{add_install_op_to_blocks_vector, create_edges};
use blockdelta::graphlib::extent::extent_for_range;
use blockdelta::graphlib::graph::{
    Graph, InstallOperation, OperationKind, Vertex, VertexIndex,
};
use blockdelta::{Block, OperationRegenerator, Result, convert_graph_to_dag};

struct FakeRegenerator;

impl OperationRegenerator for FakeRegenerator {
    fn regenerate_full_operation(&mut self, vertex: &Vertex) -> Result<InstallOperation> {
        Ok(InstallOperation {
            kind: OperationKind::ReplaceBz,
            src_extents: Vec::new(),
            dst_extents: vertex.op.dst_extents.clone(),
            data_offset: None,
            data_length: None,
        })
    }
}

fn build_graph(ops: &[(OperationKind, Vec<(u64, u64)>, Vec<(u64, u64)>, &str)], num_blocks: usize) -> Graph {
    let mut graph = Graph::new();
    let mut blocks = vec![Block::default(); num_blocks];
    for (kind, src, dst, name) in ops {
        let op = InstallOperation {
            kind: *kind,
            src_extents: src.iter().map(|&(s, n)| extent_for_range(s, n)).collect(),
            dst_extents: dst.iter().map(|&(s, n)| extent_for_range(s, n)).collect(),
            ..Default::default()
        };
        let vertex = graph.add_vertex(Vertex::new(op, *name));
        let op = graph[vertex].op.clone();
        add_install_op_to_blocks_vector(&op, &graph, vertex, &mut blocks).unwrap();
    }
    create_edges(&mut graph, &blocks);
    graph
}

fn assert_order_respects_edges(graph: &Graph, order: &[VertexIndex]) {
    let mut position = vec![usize::MAX; graph.len()];
    for (i, &v) in order.iter().enumerate() {
        position[v.0] = i;
    }
    for v in graph.indices().filter(|&v| graph[v].valid) {
        assert_ne!(position[v.0], usize::MAX);
        for &succ in graph[v].out_edges.keys() {
            assert!(position[succ.0] < position[v.0]);
        }
    }
}

#[test]
fn acyclic_graph_passes_through_untouched() {
    // A simple shift: each file moves into blocks the previous one vacates.
    let graph_ops = [
        (OperationKind::Move, vec![(2, 2)], vec![(0, 2)], "a"),
        (OperationKind::Move, vec![(4, 2)], vec![(2, 2)], "b"),
        (OperationKind::Replace, vec![], vec![(4, 2)], "c"),
    ];
    let mut graph = build_graph(&graph_ops, 6);
    let result = convert_graph_to_dag(&mut graph, &mut FakeRegenerator).unwrap();

    assert_eq!(result.summary.cut_edges, 0);
    assert_eq!(result.summary.synthetic_vertices, 0);
    assert_eq!(result.summary.demoted_cut_groups, 0);
    assert_eq!(result.order.len(), 3);
    assert_order_respects_edges(&graph, &result.order);
    // The full op runs last even though nothing depends on it.
    assert_eq!(*result.order.last().unwrap(), VertexIndex(2));
}

#[test]
fn three_file_rotation_is_broken_with_one_cut() {
    // v0, v1, v2 rotate through blocks 0..6; v3 is unrelated fresh data whose
    // destination blocks double as scratch.
    let graph_ops = [
        (OperationKind::Move, vec![(0, 2)], vec![(2, 2)], "v0"),
        (OperationKind::Move, vec![(2, 2)], vec![(4, 2)], "v1"),
        (OperationKind::Move, vec![(4, 2)], vec![(0, 2)], "v2"),
        (OperationKind::Replace, vec![], vec![(6, 2)], "v3"),
    ];
    let mut graph = build_graph(&graph_ops, 8);
    let result = convert_graph_to_dag(&mut graph, &mut FakeRegenerator).unwrap();

    assert_eq!(result.summary.cut_edges, 1);
    assert_eq!(result.summary.synthetic_vertices, 1);
    assert_eq!(result.summary.skipped_full_ops, 1);
    assert_eq!(result.summary.demoted_cut_groups, 0);
    assert_eq!(result.summary.vertices, 5);

    // Everything valid is scheduled exactly once, dependencies first.
    assert_eq!(result.order.len(), 5);
    assert_order_respects_edges(&graph, &result.order);

    // The scratch copy landed in v3's destination blocks.
    let copy = VertexIndex(4);
    assert!(graph[copy].valid);
    for extent in &graph[copy].op.dst_extents {
        assert!(extent.start_block >= 6 && extent.end_block() <= 8);
    }

    // Every source block referenced by a surviving MOVE is a real image block.
    for v in result.order.iter().copied() {
        for extent in &graph[v].op.src_extents {
            assert!(extent.end_block() <= 8);
        }
    }
}

#[test]
fn rotation_without_spare_blocks_demotes_one_mover() {
    let graph_ops = [
        (OperationKind::Move, vec![(0, 2)], vec![(2, 2)], "v0"),
        (OperationKind::Move, vec![(2, 2)], vec![(4, 2)], "v1"),
        (OperationKind::Move, vec![(4, 2)], vec![(0, 2)], "v2"),
    ];
    let mut graph = build_graph(&graph_ops, 6);
    let result = convert_graph_to_dag(&mut graph, &mut FakeRegenerator).unwrap();

    assert_eq!(result.summary.cut_edges, 1);
    assert_eq!(result.summary.demoted_cut_groups, 1);

    let demoted: Vec<VertexIndex> = graph
        .indices()
        .filter(|&v| graph[v].valid && graph[v].op.kind.is_full())
        .collect();
    assert_eq!(demoted.len(), 1);
    assert_eq!(graph[demoted[0]].op.kind, OperationKind::ReplaceBz);

    // The dead copy vertex is not scheduled.
    assert_eq!(result.order.len(), 3);
    assert_order_respects_edges(&graph, &result.order);
    assert_eq!(*result.order.last().unwrap(), demoted[0]);
}

#[test]
fn empty_graph_yields_empty_order() {
    let mut graph = Graph::new();
    let result = convert_graph_to_dag(&mut graph, &mut FakeRegenerator).unwrap();
    assert!(result.order.is_empty());
    assert_eq!(result.summary.vertices, 0);
}
