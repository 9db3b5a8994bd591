use blockdelta::graphlib::extent::{TEMP_BLOCK_START, extent_for_range};
use blockdelta::graphlib::graph::{
    EdgeProperties, Graph, InstallOperation, OperationKind, Vertex, VertexIndex,
};
use blockdelta::{OperationRegenerator, Result, convert_graph_to_dag};

#[derive(Default)]
struct FakeRegenerator {
    calls: usize,
}

impl OperationRegenerator for FakeRegenerator {
    fn regenerate_full_operation(&mut self, vertex: &Vertex) -> Result<InstallOperation> {
        self.calls += 1;
        Ok(InstallOperation {
            kind: OperationKind::Replace,
            src_extents: Vec::new(),
            dst_extents: vertex.op.dst_extents.clone(),
            data_offset: None,
            data_length: None,
        })
    }
}

fn mover(graph: &mut Graph, src: u64, dst: u64, len: u64, name: &str) -> VertexIndex {
    graph.add_vertex(Vertex::new(
        InstallOperation {
            kind: OperationKind::Move,
            src_extents: vec![extent_for_range(src, len)],
            dst_extents: vec![extent_for_range(dst, len)],
            ..Default::default()
        },
        name,
    ))
}

fn add_read_edge(graph: &mut Graph, src: VertexIndex, dst: VertexIndex, start: u64, len: u64) {
    graph[src].out_edges.insert(
        dst,
        EdgeProperties {
            extents: vec![extent_for_range(start, len)],
            write_extents: Vec::new(),
        },
    );
}

/// Two movers swapping blocks 0 and 1, cyclic. A later full op owns block 5, which
/// becomes the scratch home for the contested block.
fn swap_graph_with_spare() -> (Graph, VertexIndex, VertexIndex, VertexIndex) {
    let mut graph = Graph::new();
    let a = mover(&mut graph, 1, 0, 1, "a");
    let b = mover(&mut graph, 0, 1, 1, "b");
    add_read_edge(&mut graph, a, b, 0, 1);
    add_read_edge(&mut graph, b, a, 1, 1);
    let spare = graph.add_vertex(Vertex::new(
        InstallOperation {
            kind: OperationKind::Replace,
            dst_extents: vec![extent_for_range(5, 1)],
            ..Default::default()
        },
        "spare",
    ));
    (graph, a, b, spare)
}

fn no_temp_addresses(graph: &Graph) -> bool {
    graph.indices().filter(|&v| graph[v].valid).all(|v| {
        let vertex = &graph[v];
        vertex
            .op
            .src_extents
            .iter()
            .chain(&vertex.op.dst_extents)
            .chain(vertex.out_edges.values().flat_map(|p| &p.extents))
            .chain(vertex.out_edges.values().flat_map(|p| &p.write_extents))
            .all(|e| e.is_sparse() || e.end_block() <= TEMP_BLOCK_START)
    })
}

fn assert_order_respects_edges(graph: &Graph, order: &[VertexIndex]) {
    let mut position = vec![usize::MAX; graph.len()];
    for (i, &v) in order.iter().enumerate() {
        position[v.0] = i;
    }
    for v in graph.indices().filter(|&v| graph[v].valid) {
        assert_ne!(position[v.0], usize::MAX, "valid vertex {v} missing from order");
        for &succ in graph[v].out_edges.keys() {
            assert!(
                position[succ.0] < position[v.0],
                "dependency {succ} must run before {v}"
            );
        }
    }
}

#[test]
fn scratch_is_borrowed_from_later_full_op() {
    let (mut graph, a, b, spare) = swap_graph_with_spare();
    let mut regenerator = FakeRegenerator::default();
    let result = convert_graph_to_dag(&mut graph, &mut regenerator).unwrap();

    assert_eq!(result.summary.cut_edges, 1);
    assert_eq!(result.summary.synthetic_vertices, 1);
    assert_eq!(result.summary.demoted_cut_groups, 0);
    assert_eq!(regenerator.calls, 0);
    assert!(no_temp_addresses(&graph));

    // The copy vertex parks the contested block in the spare's destination block.
    let copy = VertexIndex(3);
    assert!(graph[copy].valid);
    assert_eq!(graph[copy].op.dst_extents, vec![extent_for_range(5, 1)]);
    // The spare may not overwrite block 5 until the consumer has read it.
    let consumer = if graph[a].op.src_extents == vec![extent_for_range(5, 1)] {
        a
    } else {
        b
    };
    let supplier_edge = &graph[spare].out_edges[&consumer];
    assert_eq!(supplier_edge.extents, vec![extent_for_range(5, 1)]);

    assert_order_respects_edges(&graph, &result.order);
    // Full ops still run last.
    assert_eq!(*result.order.last().unwrap(), spare);
}

#[test]
fn without_scratch_the_consumer_is_demoted_to_full() {
    let mut graph = Graph::new();
    let a = mover(&mut graph, 1, 0, 1, "a");
    let b = mover(&mut graph, 0, 1, 1, "b");
    add_read_edge(&mut graph, a, b, 0, 1);
    add_read_edge(&mut graph, b, a, 1, 1);

    let mut regenerator = FakeRegenerator::default();
    let result = convert_graph_to_dag(&mut graph, &mut regenerator).unwrap();

    assert_eq!(result.summary.cut_edges, 1);
    assert_eq!(result.summary.demoted_cut_groups, 1);
    assert_eq!(regenerator.calls, 1);

    // One of the movers was regenerated as a full op; the copy vertex is dead.
    let copy = VertexIndex(2);
    assert!(!graph[copy].valid);
    assert!(!result.order.contains(&copy));
    let demoted = if graph[a].op.kind.is_full() { a } else { b };
    assert!(graph[demoted].op.kind.is_full());
    assert!(graph[demoted].op.src_extents.is_empty());

    assert!(no_temp_addresses(&graph));
    assert_order_respects_edges(&graph, &result.order);
    assert_eq!(*result.order.last().unwrap(), demoted);
}

#[test]
fn group_of_cuts_into_one_consumer_shares_one_scan() {
    // Two writers both overwrite blocks the consumer reads, yielding two cuts with
    // the same old_dst. Both scratch copies must resolve against the same supplier.
    let mut graph = Graph::new();
    let consumer = graph.add_vertex(Vertex::new(
        InstallOperation {
            kind: OperationKind::Move,
            src_extents: vec![extent_for_range(0, 2)],
            dst_extents: vec![extent_for_range(10, 2)],
            ..Default::default()
        },
        "consumer",
    ));
    let w1 = mover(&mut graph, 10, 0, 2, "w1");
    let w2 = mover(&mut graph, 10, 1, 2, "w2");
    // consumer reads 0..2 which w1/w2 write; w1/w2 read 10..12 which consumer
    // writes. The return edges are lighter, so the cuts land on them and both
    // cuts share the consumer as old_dst.
    add_read_edge(&mut graph, w1, consumer, 0, 1);
    add_read_edge(&mut graph, w2, consumer, 1, 1);
    add_read_edge(&mut graph, consumer, w1, 10, 2);
    add_read_edge(&mut graph, consumer, w2, 10, 2);
    let spare = graph.add_vertex(Vertex::new(
        InstallOperation {
            kind: OperationKind::ReplaceBz,
            dst_extents: vec![extent_for_range(20, 4)],
            ..Default::default()
        },
        "spare",
    ));

    let mut regenerator = FakeRegenerator::default();
    let result = convert_graph_to_dag(&mut graph, &mut regenerator).unwrap();

    assert_eq!(result.summary.cut_edges, 2);
    assert_eq!(result.summary.demoted_cut_groups, 0);
    assert!(no_temp_addresses(&graph));
    assert_order_respects_edges(&graph, &result.order);
    // Both scratch blocks came out of the spare's four destination blocks.
    for copy in [VertexIndex(4), VertexIndex(5)] {
        assert!(graph[copy].valid);
        for extent in &graph[copy].op.dst_extents {
            assert!(extent.start_block >= 20 && extent.end_block() <= 24);
        }
    }
    let _ = spare;
}
