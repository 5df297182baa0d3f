use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::{
    reducers::{Reducer, ReducerError},
    state::{StateSchema, VersionedState},
};

/// Maps state fields to their reducer implementations.
///
/// Built once from the compiled schema and shared by the executor. The
/// registry applies one node update map at a time, in schema declaration
/// order, so a barrier that folds several partials produces the same state
/// regardless of task completion timing.
#[derive(Clone)]
pub struct ReducerRegistry {
    by_field: FxHashMap<String, Arc<dyn Reducer>>,
}

impl ReducerRegistry {
    /// Materialize reducers for every field the schema declares.
    #[must_use]
    pub fn from_schema(schema: &StateSchema) -> Self {
        let by_field = schema
            .fields()
            .map(|spec| (spec.name().to_string(), spec.reducer_spec().reducer()))
            .collect();
        Self { by_field }
    }

    /// Apply a single node's update map to the state.
    ///
    /// Fields are folded in schema declaration order. Versions are NOT
    /// bumped here; the barrier compares before/after values and bumps
    /// versions once per super-step.
    ///
    /// # Errors
    ///
    /// [`ReducerError::UnknownField`] if the update names a field the
    /// schema does not declare.
    pub fn apply(
        &self,
        state: &mut VersionedState,
        update: &FxHashMap<String, Value>,
    ) -> Result<(), ReducerError> {
        for key in update.keys() {
            if !self.by_field.contains_key(key) {
                return Err(ReducerError::UnknownField { field: key.clone() });
            }
        }
        let fields: Vec<String> = state.schema().field_names().cloned().collect();
        for field in fields {
            if let Some(incoming) = update.get(&field) {
                let reducer = Arc::clone(&self.by_field[&field]);
                let current = state
                    .value_mut(&field)
                    .expect("schema fields are always materialized");
                reducer.apply(current, incoming.clone());
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ReducerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields: Vec<&String> = self.by_field.keys().collect();
        fields.sort();
        f.debug_struct("ReducerRegistry")
            .field("fields", &fields)
            .finish()
    }
}
