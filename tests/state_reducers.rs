use plait::reducers::{Reducer, ReducerRegistry, ReducerSpec};
use plait::state::{StateSchema, VersionedState};
use plait::utils::collections::update_map;
use serde_json::{json, Value};
use std::sync::Arc;

fn schema() -> Arc<StateSchema> {
    Arc::new(
        StateSchema::builder()
            .field("answer", ReducerSpec::LastValue)
            .field("notes", ReducerSpec::Append)
            .field("count", ReducerSpec::Sum)
            .build(),
    )
}

#[test]
fn fresh_state_seeds_defaults() {
    let state = VersionedState::new(schema());
    assert_eq!(state.get("answer"), Some(&Value::Null));
    assert_eq!(state.get("notes"), Some(&json!([])));
    assert_eq!(state.version("answer"), Some(1));
}

#[test]
fn schema_preserves_declaration_order() {
    let state = VersionedState::new(schema());
    let snapshot = state.snapshot();
    let order: Vec<&String> = snapshot.iter().map(|(name, _)| name).collect();
    assert_eq!(order, ["answer", "notes", "count"]);
}

#[test]
fn redeclaring_a_field_keeps_its_position() {
    let schema = StateSchema::builder()
        .field("a", ReducerSpec::LastValue)
        .field("b", ReducerSpec::LastValue)
        .field_with_default("a", ReducerSpec::Sum, json!(10))
        .build();
    let names: Vec<&String> = schema.field_names().collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(schema.get("a").unwrap().default_value(), &json!(10));
}

#[test]
fn registry_applies_each_field_through_its_reducer() {
    let schema = schema();
    let registry = ReducerRegistry::from_schema(&schema);
    let mut state = VersionedState::new(Arc::clone(&schema));

    registry
        .apply(
            &mut state,
            &update_map([
                ("answer", json!("first")),
                ("notes", json!("n1")),
                ("count", json!(2)),
            ]),
        )
        .unwrap();
    registry
        .apply(
            &mut state,
            &update_map([
                ("answer", json!("second")),
                ("notes", json!("n2")),
                ("count", json!(3)),
            ]),
        )
        .unwrap();

    assert_eq!(state.get("answer"), Some(&json!("second")));
    assert_eq!(state.get("notes"), Some(&json!(["n1", "n2"])));
    assert_eq!(state.get("count"), Some(&json!(5)));
}

#[test]
fn registry_rejects_undeclared_fields() {
    let schema = schema();
    let registry = ReducerRegistry::from_schema(&schema);
    let mut state = VersionedState::new(Arc::clone(&schema));
    let err = registry
        .apply(&mut state, &update_map([("ghost", json!(1))]))
        .err()
        .unwrap();
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn snapshots_are_isolated_from_later_mutation() {
    let schema = schema();
    let registry = ReducerRegistry::from_schema(&schema);
    let mut state = VersionedState::new(Arc::clone(&schema));
    registry
        .apply(&mut state, &update_map([("answer", json!("before"))]))
        .unwrap();

    let snapshot = state.snapshot();
    registry
        .apply(&mut state, &update_map([("answer", json!("after"))]))
        .unwrap();

    assert_eq!(snapshot.get("answer"), Some(&json!("before")));
    assert_eq!(state.get("answer"), Some(&json!("after")));
}

#[test]
fn custom_reducers_plug_in() {
    struct Max;
    impl Reducer for Max {
        fn apply(&self, current: &mut Value, update: Value) {
            let a = current.as_i64().unwrap_or(i64::MIN);
            let b = update.as_i64().unwrap_or(i64::MIN);
            *current = json!(a.max(b));
        }
    }

    let schema = Arc::new(
        StateSchema::builder()
            .field_with_default("peak", ReducerSpec::Custom(Arc::new(Max)), json!(0))
            .build(),
    );
    let registry = ReducerRegistry::from_schema(&schema);
    let mut state = VersionedState::new(Arc::clone(&schema));

    for value in [3, 9, 4] {
        registry
            .apply(&mut state, &update_map([("peak", json!(value))]))
            .unwrap();
    }
    assert_eq!(state.get("peak"), Some(&json!(9)));
}

#[test]
fn persisted_round_trip_restores_values_and_versions() {
    let schema = schema();
    let registry = ReducerRegistry::from_schema(&schema);
    let mut state = VersionedState::new(Arc::clone(&schema));
    registry
        .apply(&mut state, &update_map([("count", json!(7))]))
        .unwrap();
    if let Some(v) = state.value_mut("answer") {
        *v = json!("kept");
    }

    let restored = VersionedState::from_persisted(
        Arc::clone(&schema),
        state.values_map(),
        &state.versions_map(),
    );
    assert_eq!(restored.get("count"), Some(&json!(7)));
    assert_eq!(restored.get("answer"), Some(&json!("kept")));
    assert_eq!(restored.version("count"), state.version("count"));
}
