mod common;

use common::quiet_runtime;
use plait::graphs::GraphBuilder;
use plait::node::{FnNode, NodePartial};
use plait::reducers::ReducerSpec;
use plait::runtimes::{
    AppRunner, CheckpointerType, RunConfig, RunOutcome, RunnerError,
};
use plait::state::StateSchema;
use plait::types::NodeKind;
use plait::utils::collections::{new_update_map, update_map};
use serde_json::json;

/// Start -> first -> second -> End, appending to `trace` at each step.
fn trace_app() -> plait::app::App {
    GraphBuilder::new()
        .with_schema(
            StateSchema::builder()
                .field("trace", ReducerSpec::Append)
                .field("note", ReducerSpec::LastValue)
                .build(),
        )
        .with_runtime_config(quiet_runtime())
        .add_node(
            "first",
            FnNode::new(|_s, _c| async move {
                Ok(NodePartial::new().with_value("trace", json!("first")))
            }),
        )
        .add_node(
            "second",
            FnNode::new(|snapshot, _c| async move {
                let note = snapshot
                    .get("note")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unset")
                    .to_string();
                Ok(NodePartial::new().with_value("trace", json!(format!("second saw {note}"))))
            }),
        )
        .add_edge(NodeKind::Start, "first")
        .add_edge("first", "second")
        .add_edge("second", NodeKind::End)
        .compile()
        .unwrap()
}

#[tokio::test]
async fn history_is_an_ordered_chain_of_parented_checkpoints() {
    common::init_tracing();
    let app = trace_app();
    let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await;
    runner
        .create_thread("t".into(), new_update_map())
        .await
        .unwrap();
    runner.run_until_complete("t", 25).await.unwrap();

    let history = runner.history("t").await.unwrap();
    // Root (step 0) plus one checkpoint per super-step.
    assert_eq!(history.len(), 3);
    assert_eq!(
        history.iter().map(|m| m.step).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    for pair in history.windows(2) {
        assert!(pair[0].id < pair[1].id);
        assert_eq!(pair[1].parent_id.as_ref(), Some(&pair[0].id));
    }
    assert!(history[0].parent_id.is_none());
}

#[tokio::test]
async fn replaying_from_a_checkpoint_reproduces_the_run() {
    let app = trace_app();
    let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await;
    runner
        .create_thread("t".into(), new_update_map())
        .await
        .unwrap();
    let RunOutcome::Completed(original) = runner.run_until_complete("t", 25).await.unwrap() else {
        panic!("expected completion");
    };

    let history = runner.history("t").await.unwrap();
    let step1 = history.iter().find(|m| m.step == 1).unwrap().id.clone();

    runner.load_thread_at("t", &step1).await.unwrap();
    let RunOutcome::Completed(replayed) = runner.run_until_complete("t", 25).await.unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(original.values_map(), replayed.values_map());
}

#[tokio::test]
async fn branching_preserves_the_original_chain() {
    let app = trace_app();
    let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await;
    runner
        .create_thread("t".into(), new_update_map())
        .await
        .unwrap();
    runner.run_until_complete("t", 25).await.unwrap();

    let original_history = runner.history("t").await.unwrap();
    let step1 = original_history
        .iter()
        .find(|m| m.step == 1)
        .unwrap()
        .id
        .clone();
    let original_child = original_history
        .iter()
        .find(|m| m.parent_id.as_ref() == Some(&step1))
        .unwrap()
        .id
        .clone();

    // Fork at step 1 with edited state, then run the alternate future.
    let fork = runner
        .update_state("t", Some(&step1), update_map([("note", json!("edited"))]))
        .await
        .unwrap();
    let RunOutcome::Completed(branched) = runner.run_until_complete("t", 25).await.unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(
        branched.get("trace"),
        Some(&json!(["first", "second saw edited"]))
    );

    let history = runner.history("t").await.unwrap();
    let fork_meta = history.iter().find(|m| m.id == fork).unwrap();
    assert_eq!(fork_meta.parent_id.as_ref(), Some(&step1));

    // The fork checkpoint and the original step-2 checkpoint are siblings;
    // nothing from the original chain was deleted or rewritten.
    let original_child_meta = history.iter().find(|m| m.id == original_child).unwrap();
    assert_eq!(original_child_meta.parent_id.as_ref(), Some(&step1));
    assert!(history.len() > original_history.len());

    // The historical checkpoint itself is untouched by the branch.
    let checkpointer = runner.checkpointer().unwrap();
    let stored = checkpointer.get("t", Some(&step1)).await.unwrap().unwrap();
    assert_eq!(stored.state_values.get("note"), Some(&json!(null)));
}

#[tokio::test]
async fn unknown_checkpoint_id_is_an_error() {
    let app = trace_app();
    let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await;
    runner
        .create_thread("t".into(), new_update_map())
        .await
        .unwrap();

    let missing = plait::runtimes::CheckpointId::from_string("9999999999999-000000");
    let err = runner.load_thread_at("t", &missing).await.err().unwrap();
    assert!(matches!(err, RunnerError::CheckpointNotFound { .. }));
}

#[tokio::test]
async fn time_travel_through_run_config() {
    let app = trace_app();

    // First run to completion on thread "t".
    let RunOutcome::Completed(_) = app
        .invoke(new_update_map(), RunConfig::new().with_thread_id("t"))
        .await
        .unwrap()
    else {
        panic!("expected completion");
    };

    // Find the post-`first` checkpoint via a throwaway runner sharing the
    // App's checkpoint store.
    let checkpointer = app.shared_checkpointer().await.unwrap();
    let history = checkpointer.list("t").await.unwrap();
    let step1 = history.iter().find(|m| m.step == 1).unwrap().id.clone();

    let RunOutcome::Completed(replayed) = app
        .invoke(
            new_update_map(),
            RunConfig::new()
                .with_thread_id("t")
                .with_checkpoint_id(step1),
        )
        .await
        .unwrap()
    else {
        panic!("expected completion");
    };
    assert_eq!(
        replayed.get("trace"),
        Some(&json!(["first", "second saw unset"]))
    );
}
