mod common;

use common::NoopNode;
use plait::graphs::{Dispatch, GraphBuilder, GraphError};
use plait::types::NodeKind;
use std::sync::Arc;

#[test]
fn compile_simple_linear_graph() {
    let app = GraphBuilder::new()
        .add_node("worker", NoopNode)
        .add_edge(NodeKind::Start, "worker")
        .add_edge("worker", NodeKind::End)
        .compile()
        .unwrap();
    assert_eq!(app.nodes().len(), 1);
    assert!(app.edges().contains_key(&NodeKind::Start));
}

#[test]
fn compile_rejects_empty_graph() {
    let err = GraphBuilder::new().compile().err().unwrap();
    assert!(matches!(err, GraphError::MissingEntry));
}

#[test]
fn compile_rejects_unregistered_edge_target() {
    let err = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_edge(NodeKind::Start, "a")
        .add_edge("a", "ghost")
        .compile()
        .err()
        .unwrap();
    match err {
        GraphError::UnknownNode { referenced, .. } => assert_eq!(referenced, "ghost"),
        other => panic!("expected UnknownNode, got {other:?}"),
    }
}

#[test]
fn compile_rejects_unregistered_conditional_target() {
    let err = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_edge(NodeKind::Start, "a")
        .add_conditional_edge(
            "a",
            Arc::new(|_s| vec!["End".to_string()]),
            vec![NodeKind::End, NodeKind::Custom("ghost".into())],
        )
        .compile()
        .err()
        .unwrap();
    assert!(matches!(err, GraphError::UnknownNode { .. }));
}

#[test]
fn compile_rejects_unreachable_end() {
    // a -> b and back; no declared route ever reaches End.
    let err = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .add_edge(NodeKind::Start, "a")
        .add_edge("a", "b")
        .add_edge("b", "a")
        .compile()
        .err()
        .unwrap();
    assert!(matches!(err, GraphError::UnreachableEnd));
}

#[test]
fn conditional_edge_declaring_end_satisfies_reachability() {
    // The cycle has an exit label even if the router never takes it.
    let app = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .add_edge(NodeKind::Start, "a")
        .add_edge("a", "b")
        .add_conditional_edge(
            "b",
            Arc::new(|_s| vec!["a".to_string()]),
            vec![NodeKind::Custom("a".into()), NodeKind::End],
        )
        .compile();
    assert!(app.is_ok());
}

#[test]
fn dynamic_edge_satisfies_reachability() {
    // Dispatch destinations are runtime-resolved, so a dynamic edge on a
    // reachable node is enough to compile.
    let app = GraphBuilder::new()
        .add_node("planner", NoopNode)
        .add_node("worker", NoopNode)
        .add_edge(NodeKind::Start, "planner")
        .add_dynamic_edge(
            "planner",
            Arc::new(|_s| vec![Dispatch::new("worker", serde_json::json!(1))]),
        )
        .compile();
    assert!(app.is_ok());
}

#[test]
fn virtual_nodes_cannot_be_registered() {
    let app = GraphBuilder::new()
        .add_node(NodeKind::Start, NoopNode)
        .add_node(NodeKind::End, NoopNode)
        .add_node("real", NoopNode)
        .add_edge(NodeKind::Start, "real")
        .add_edge("real", NodeKind::End)
        .compile()
        .unwrap();
    assert_eq!(app.nodes().len(), 1);
}

#[test]
fn node_kind_encoding_round_trips() {
    for kind in [
        NodeKind::Start,
        NodeKind::End,
        NodeKind::Custom("Processor".into()),
    ] {
        assert_eq!(NodeKind::decode(&kind.encode()), kind);
    }
    assert_eq!(
        NodeKind::decode("Unknown"),
        NodeKind::Custom("Unknown".into())
    );
}
