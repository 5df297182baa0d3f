mod common;

use common::{counter_schema, quiet_runtime};
use plait::event_bus::{Event, STREAM_END_SCOPE};
use plait::graphs::{Dispatch, GraphBuilder};
use plait::node::{FnNode, NodePartial};
use plait::reducers::ReducerSpec;
use plait::runtimes::{RunConfig, RunOutcome, RunnerError, StreamMode};
use plait::state::StateSchema;
use plait::types::NodeKind;
use plait::utils::collections::{new_update_map, update_map};
use serde_json::{json, Value};
use std::sync::Arc;

fn completed(outcome: RunOutcome) -> plait::state::VersionedState {
    match outcome {
        RunOutcome::Completed(state) => state,
        RunOutcome::Interrupted(pending) => panic!("unexpected suspension: {pending:?}"),
    }
}

/// Two-node pipeline with a sum reducer: A adds 1, B adds 2.
fn sum_pipeline() -> plait::app::App {
    GraphBuilder::new()
        .with_schema(counter_schema())
        .with_runtime_config(quiet_runtime())
        .add_node(
            "a",
            FnNode::new(|_s, _c| async move {
                Ok(NodePartial::new().with_value("count", json!(1)))
            }),
        )
        .add_node(
            "b",
            FnNode::new(|_s, _c| async move {
                Ok(NodePartial::new().with_value("count", json!(2)))
            }),
        )
        .add_edge(NodeKind::Start, "a")
        .add_edge("a", "b")
        .add_edge("b", NodeKind::End)
        .compile()
        .unwrap()
}

#[tokio::test]
async fn sum_reducer_accumulates_across_steps() {
    let app = sum_pipeline();
    let state = completed(
        app.invoke(new_update_map(), RunConfig::new().with_thread_id("sum"))
            .await
            .unwrap(),
    );
    assert_eq!(state.get("count"), Some(&json!(3)));
}

#[tokio::test]
async fn repeated_runs_are_deterministic() {
    let app = sum_pipeline();
    let first = completed(
        app.invoke(new_update_map(), RunConfig::new().with_thread_id("d1"))
            .await
            .unwrap(),
    );
    let second = completed(
        app.invoke(new_update_map(), RunConfig::new().with_thread_id("d2"))
            .await
            .unwrap(),
    );
    assert_eq!(first.values_map(), second.values_map());
}

#[tokio::test]
async fn input_seeds_the_initial_state() {
    let app = sum_pipeline();
    let state = completed(
        app.invoke(
            update_map([("count", json!(10))]),
            RunConfig::new().with_thread_id("seeded"),
        )
        .await
        .unwrap(),
    );
    assert_eq!(state.get("count"), Some(&json!(13)));
}

#[tokio::test]
async fn conditional_edge_routes_by_state() {
    let schema = StateSchema::builder()
        .field("kind", ReducerSpec::LastValue)
        .field("handled_by", ReducerSpec::LastValue)
        .build();
    let app = GraphBuilder::new()
        .with_schema(schema)
        .with_runtime_config(quiet_runtime())
        .add_node(
            "classify",
            FnNode::new(|snapshot, _c| async move {
                let kind = snapshot.get("kind").cloned().unwrap_or(Value::Null);
                Ok(NodePartial::new().with_value("kind", kind))
            }),
        )
        .add_node(
            "urgent",
            FnNode::new(|_s, _c| async move {
                Ok(NodePartial::new().with_value("handled_by", json!("urgent")))
            }),
        )
        .add_node(
            "routine",
            FnNode::new(|_s, _c| async move {
                Ok(NodePartial::new().with_value("handled_by", json!("routine")))
            }),
        )
        .add_edge(NodeKind::Start, "classify")
        .add_conditional_edge(
            "classify",
            Arc::new(|snapshot| {
                if snapshot.get("kind") == Some(&json!("urgent")) {
                    vec!["urgent".to_string()]
                } else {
                    vec!["routine".to_string()]
                }
            }),
            ["urgent", "routine"],
        )
        .add_edge("urgent", NodeKind::End)
        .add_edge("routine", NodeKind::End)
        .compile()
        .unwrap();

    let state = completed(
        app.invoke(
            update_map([("kind", json!("urgent"))]),
            RunConfig::new().with_thread_id("cond-1"),
        )
        .await
        .unwrap(),
    );
    assert_eq!(state.get("handled_by"), Some(&json!("urgent")));

    let state = completed(
        app.invoke(
            update_map([("kind", json!("normal"))]),
            RunConfig::new().with_thread_id("cond-2"),
        )
        .await
        .unwrap(),
    );
    assert_eq!(state.get("handled_by"), Some(&json!("routine")));
}

#[tokio::test]
async fn dynamic_fanout_runs_one_task_per_packet() {
    let schema = StateSchema::builder()
        .field("plan", ReducerSpec::LastValue)
        .field("sections", ReducerSpec::Append)
        .build();
    let app = GraphBuilder::new()
        .with_schema(schema)
        .with_runtime_config(quiet_runtime())
        .add_node(
            "planner",
            FnNode::new(|_s, _c| async move {
                Ok(NodePartial::new().with_value("plan", json!(["intro", "body", "outro"])))
            }),
        )
        .add_node(
            "worker",
            FnNode::new(|_s, ctx| async move {
                let section = ctx.payload().cloned().unwrap_or(Value::Null);
                Ok(NodePartial::new()
                    .with_value("sections", json!(format!("wrote {}", section.as_str().unwrap_or("?")))))
            }),
        )
        .add_edge(NodeKind::Start, "planner")
        .add_dynamic_edge(
            "planner",
            Arc::new(|snapshot| {
                snapshot
                    .get("plan")
                    .and_then(Value::as_array)
                    .map(|sections| {
                        sections
                            .iter()
                            .map(|s| Dispatch::new("worker", s.clone()))
                            .collect()
                    })
                    .unwrap_or_default()
            }),
        )
        .add_edge("worker", NodeKind::End)
        .compile()
        .unwrap();

    let state = completed(
        app.invoke(new_update_map(), RunConfig::new().with_thread_id("fan"))
            .await
            .unwrap(),
    );
    let sections = state.get("sections").and_then(Value::as_array).unwrap();
    assert_eq!(sections.len(), 3);
    for expected in ["wrote intro", "wrote body", "wrote outro"] {
        assert!(sections.contains(&json!(expected)), "missing {expected}");
    }
}

#[tokio::test]
async fn unconditional_cycle_hits_recursion_limit() {
    let app = GraphBuilder::new()
        .with_schema(counter_schema())
        .with_runtime_config(quiet_runtime())
        .add_node(
            "a",
            FnNode::new(|_s, _c| async move {
                Ok(NodePartial::new().with_value("count", json!(1)))
            }),
        )
        .add_node(
            "b",
            FnNode::new(|_s, _c| async move { Ok(NodePartial::default()) }),
        )
        .add_edge(NodeKind::Start, "a")
        .add_edge("a", "b")
        // Declares an exit label the router never takes.
        .add_conditional_edge(
            "b",
            Arc::new(|_s| vec!["a".to_string()]),
            [NodeKind::Custom("a".into()), NodeKind::End],
        )
        .compile()
        .unwrap();

    let err = app
        .invoke(
            new_update_map(),
            RunConfig::new()
                .with_thread_id("loop")
                .with_recursion_limit(5),
        )
        .await
        .err()
        .unwrap();
    match err {
        RunnerError::RecursionLimit { limit } => assert_eq!(limit, 5),
        other => panic!("expected RecursionLimit, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_node_leaves_last_checkpoint_resumable() {
    use std::sync::atomic::{AtomicBool, Ordering};
    let should_fail = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&should_fail);

    let app = GraphBuilder::new()
        .with_schema(counter_schema())
        .with_runtime_config(quiet_runtime())
        .add_node(
            "a",
            FnNode::new(|_s, _c| async move {
                Ok(NodePartial::new().with_value("count", json!(1)))
            }),
        )
        .add_node(
            "flaky",
            FnNode::new(move |_s, _c| {
                let flag = flag.clone();
                async move {
                    if flag.load(Ordering::SeqCst) {
                        Err(plait::node::NodeError::ValidationFailed("boom".into()))
                    } else {
                        Ok(NodePartial::new().with_value("count", json!(10)))
                    }
                }
            }),
        )
        .add_edge(NodeKind::Start, "a")
        .add_edge("a", "flaky")
        .add_edge("flaky", NodeKind::End)
        .compile()
        .unwrap();

    let config = RunConfig::new().with_thread_id("flaky-thread");
    let err = app
        .invoke(new_update_map(), config.clone())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RunnerError::Scheduler(_)));

    // Retry against the same thread: `a` already committed (count == 1),
    // only the failed step re-runs.
    should_fail.store(false, Ordering::SeqCst);
    let state = completed(app.invoke(new_update_map(), config).await.unwrap());
    assert_eq!(state.get("count"), Some(&json!(11)));
}

#[tokio::test]
async fn streaming_emits_step_events_and_stream_end() {
    let app = sum_pipeline();
    let (handle, events) = app
        .invoke_streaming(new_update_map(), RunConfig::new().with_thread_id("stream"))
        .await;
    let outcome = handle.join().await.unwrap();
    completed(outcome);

    let events: Vec<Event> = events.drain().collect();
    let steps: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::Step(s) => Some(s.step),
            _ => None,
        })
        .collect();
    assert_eq!(steps, vec![1, 2]);
    assert!(events
        .iter()
        .any(|e| e.scope_label() == Some(STREAM_END_SCOPE)));
}

#[tokio::test]
async fn values_stream_mode_carries_full_state() {
    let app = sum_pipeline();
    let (handle, events) = app
        .invoke_streaming(
            new_update_map(),
            RunConfig::new()
                .with_thread_id("stream-values")
                .with_stream_mode(StreamMode::Values),
        )
        .await;
    handle.join().await.unwrap();

    let values: Vec<Value> = events
        .drain()
        .filter_map(|e| match e {
            Event::Values(v) => v.values.get("count").cloned(),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![json!(1), json!(3)]);
}
