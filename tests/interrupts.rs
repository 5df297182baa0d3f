mod common;

use common::quiet_runtime;
use plait::graphs::GraphBuilder;
use plait::node::{FnNode, NodePartial};
use plait::reducers::ReducerSpec;
use plait::runtimes::{RunConfig, RunOutcome};
use plait::state::StateSchema;
use plait::types::NodeKind;
use plait::utils::collections::new_update_map;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn approval_schema() -> StateSchema {
    StateSchema::builder()
        .field("approval", ReducerSpec::LastValue)
        .field("log", ReducerSpec::Append)
        .build()
}

/// Graph with a single `ask` node that suspends on an interrupt, plus an
/// execution counter to observe replays.
fn ask_app(runs: Arc<AtomicUsize>) -> plait::app::App {
    GraphBuilder::new()
        .with_schema(approval_schema())
        .with_runtime_config(quiet_runtime())
        .add_node(
            "ask",
            FnNode::new(move |_s, ctx| {
                let runs = runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    let answer = ctx.interrupt(json!({"q": "ok?"}))?;
                    Ok(NodePartial::new().with_value("approval", answer))
                }
            }),
        )
        .add_edge(NodeKind::Start, "ask")
        .add_edge("ask", NodeKind::End)
        .compile()
        .unwrap()
}

#[tokio::test]
async fn interrupt_suspends_and_surfaces_payload() {
    common::init_tracing();
    let runs = Arc::new(AtomicUsize::new(0));
    let app = ask_app(Arc::clone(&runs));

    let outcome = app
        .invoke(new_update_map(), RunConfig::new().with_thread_id("x"))
        .await
        .unwrap();
    match outcome {
        RunOutcome::Interrupted(pending) => {
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].node, "ask");
            assert_eq!(pending[0].payload, json!({"q": "ok?"}));
        }
        RunOutcome::Completed(_) => panic!("expected suspension"),
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invoking_without_resume_resurfaces_the_same_interrupt() {
    let runs = Arc::new(AtomicUsize::new(0));
    let app = ask_app(Arc::clone(&runs));
    let config = RunConfig::new().with_thread_id("x");

    let first = app.invoke(new_update_map(), config.clone()).await.unwrap();
    let second = app.invoke(new_update_map(), config).await.unwrap();

    let (RunOutcome::Interrupted(a), RunOutcome::Interrupted(b)) = (first, second) else {
        panic!("expected two suspensions");
    };
    assert_eq!(a[0].payload, b[0].payload);
    // Re-surfacing does not advance or re-execute the node.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resume_completes_the_run() {
    let runs = Arc::new(AtomicUsize::new(0));
    let app = ask_app(Arc::clone(&runs));
    let config = RunConfig::new().with_thread_id("x");

    let suspended = app.invoke(new_update_map(), config.clone()).await.unwrap();
    assert!(matches!(suspended, RunOutcome::Interrupted(_)));

    let outcome = app
        .invoke(new_update_map(), config.with_resume(json!(true)))
        .await
        .unwrap();
    let RunOutcome::Completed(state) = outcome else {
        panic!("expected completion after resume");
    };
    assert_eq!(state.get("approval"), Some(&json!(true)));
    // Code before the interrupt ran again on resume; from the caller's
    // perspective the node completed exactly once overall.
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn completed_siblings_are_replayed_not_reexecuted() {
    let side_runs = Arc::new(AtomicUsize::new(0));
    let side_counter = Arc::clone(&side_runs);

    let app = GraphBuilder::new()
        .with_schema(approval_schema())
        .with_runtime_config(quiet_runtime())
        .add_node(
            "side",
            FnNode::new(move |_s, _c| {
                let side_counter = side_counter.clone();
                async move {
                    side_counter.fetch_add(1, Ordering::SeqCst);
                    Ok(NodePartial::new().with_value("log", json!("side ran")))
                }
            }),
        )
        .add_node(
            "ask",
            FnNode::new(|_s, ctx| async move {
                let answer = ctx.interrupt(json!("approve?"))?;
                Ok(NodePartial::new().with_value("approval", answer))
            }),
        )
        .add_edge(NodeKind::Start, "side")
        .add_edge(NodeKind::Start, "ask")
        .add_edge("side", NodeKind::End)
        .add_edge("ask", NodeKind::End)
        .compile()
        .unwrap();

    let config = RunConfig::new().with_thread_id("siblings");
    let suspended = app.invoke(new_update_map(), config.clone()).await.unwrap();
    assert!(matches!(suspended, RunOutcome::Interrupted(_)));
    assert_eq!(side_runs.load(Ordering::SeqCst), 1);

    let outcome = app
        .invoke(new_update_map(), config.with_resume(json!("yes")))
        .await
        .unwrap();
    let RunOutcome::Completed(state) = outcome else {
        panic!("expected completion");
    };
    // The sibling's write survived through the pending-write replay and
    // the node itself did not run a second time.
    assert_eq!(side_runs.load(Ordering::SeqCst), 1);
    assert_eq!(state.get("log"), Some(&json!(["side ran"])));
    assert_eq!(state.get("approval"), Some(&json!("yes")));
}

#[tokio::test]
async fn two_interrupts_in_one_node_resolve_in_order() {
    let app = GraphBuilder::new()
        .with_schema(approval_schema())
        .with_runtime_config(quiet_runtime())
        .add_node(
            "ask_twice",
            FnNode::new(|_s, ctx| async move {
                let first = ctx.interrupt(json!("first?"))?;
                let second = ctx.interrupt(json!("second?"))?;
                Ok(NodePartial::new().with_value("approval", json!([first, second])))
            }),
        )
        .add_edge(NodeKind::Start, "ask_twice")
        .add_edge("ask_twice", NodeKind::End)
        .compile()
        .unwrap();

    let config = RunConfig::new().with_thread_id("twice");
    let RunOutcome::Interrupted(pending) =
        app.invoke(new_update_map(), config.clone()).await.unwrap()
    else {
        panic!("expected first suspension");
    };
    assert_eq!(pending[0].payload, json!("first?"));
    assert_eq!(pending[0].ordinal, 0);

    let RunOutcome::Interrupted(pending) = app
        .invoke(new_update_map(), config.clone().with_resume(json!("a")))
        .await
        .unwrap()
    else {
        panic!("expected second suspension");
    };
    assert_eq!(pending[0].payload, json!("second?"));
    assert_eq!(pending[0].ordinal, 1);

    let RunOutcome::Completed(state) = app
        .invoke(new_update_map(), config.with_resume(json!("b")))
        .await
        .unwrap()
    else {
        panic!("expected completion");
    };
    assert_eq!(state.get("approval"), Some(&json!(["a", "b"])));
}
