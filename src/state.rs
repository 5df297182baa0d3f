//! Versioned, schema-driven state for workflow execution.
//!
//! State is an ordered mapping from field name to a versioned JSON value.
//! The field set and the reducer assigned to each field are declared on a
//! [`StateSchema`] and frozen when the graph compiles; execution can change
//! values but never the shape.
//!
//! Nodes receive an immutable [`StateSnapshot`] and return partial updates;
//! the executor folds those updates back into the [`VersionedState`] through
//! the per-field reducers at the super-step barrier. A field's version is
//! bumped only when a barrier actually changes its content, which gives
//! checkpoints a cheap change-detection signal.
//!
//! # Examples
//!
//! ```rust
//! use plait::reducers::ReducerSpec;
//! use plait::state::{StateSchema, VersionedState};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let schema = Arc::new(
//!     StateSchema::builder()
//!         .field("topic", ReducerSpec::LastValue)
//!         .field("sections", ReducerSpec::Append)
//!         .build(),
//! );
//!
//! let state = VersionedState::new(schema);
//! let snapshot = state.snapshot();
//! assert_eq!(snapshot.get("topic"), Some(&json!(null)));
//! assert_eq!(snapshot.get("sections"), Some(&json!([])));
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::reducers::ReducerSpec;

/// Declaration of one state field: its name, merge strategy, and seed value.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    name: String,
    reducer: ReducerSpec,
    default: Value,
}

impl FieldSpec {
    /// The field's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The merge strategy declared for this field.
    #[must_use]
    pub fn reducer_spec(&self) -> &ReducerSpec {
        &self.reducer
    }

    /// The value the field starts with on a fresh thread.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

/// Immutable description of the state shape: ordered fields plus their
/// reducers.
///
/// Field order is declaration order and governs merge and iteration order
/// everywhere downstream, so repeated runs observe identical folds.
#[derive(Clone, Debug, Default)]
pub struct StateSchema {
    fields: Vec<FieldSpec>,
    index: FxHashMap<String, usize>,
}

impl StateSchema {
    /// Start declaring a schema.
    #[must_use]
    pub fn builder() -> StateSchemaBuilder {
        StateSchemaBuilder::default()
    }

    /// Iterate field specs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    /// Iterate field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.iter().map(|f| &f.name)
    }

    /// Look up a field spec by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Whether the schema declares a field with this name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Fluent builder for [`StateSchema`].
///
/// Re-declaring a field name replaces the earlier declaration but keeps its
/// original position, so declaration order stays stable.
#[derive(Debug, Default)]
pub struct StateSchemaBuilder {
    fields: Vec<FieldSpec>,
}

impl StateSchemaBuilder {
    /// Declare a field whose seed value is the reducer's identity
    /// (`[]` for append, `null` otherwise).
    #[must_use]
    pub fn field(self, name: impl Into<String>, reducer: ReducerSpec) -> Self {
        let default = reducer.initial_value();
        self.field_with_default(name, reducer, default)
    }

    /// Declare a field with an explicit seed value.
    #[must_use]
    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        reducer: ReducerSpec,
        default: Value,
    ) -> Self {
        let name = name.into();
        let spec = FieldSpec {
            name: name.clone(),
            reducer,
            default,
        };
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == name) {
            *existing = spec;
        } else {
            self.fields.push(spec);
        }
        self
    }

    /// Finalize the schema.
    #[must_use]
    pub fn build(self) -> StateSchema {
        let index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        StateSchema {
            fields: self.fields,
            index,
        }
    }
}

/// One materialized state field: its current value and version counter.
#[derive(Clone, Debug, PartialEq)]
struct ValueChannel {
    value: Value,
    version: u32,
}

/// The live state container threaded through a workflow run.
///
/// Holds one versioned value per schema field. Values are only mutated at
/// the super-step barrier (through the reducer registry) or when restoring
/// from a checkpoint; node code works against [`StateSnapshot`]s.
#[derive(Clone, Debug)]
pub struct VersionedState {
    schema: Arc<StateSchema>,
    channels: Vec<ValueChannel>,
}

impl VersionedState {
    /// Fresh state with every field at its seed value, version 1.
    #[must_use]
    pub fn new(schema: Arc<StateSchema>) -> Self {
        let channels = schema
            .fields()
            .map(|f| ValueChannel {
                value: f.default_value().clone(),
                version: 1,
            })
            .collect();
        Self { schema, channels }
    }

    /// Rebuild state from persisted values and versions.
    ///
    /// Fields absent from the persisted maps fall back to their schema
    /// defaults, which keeps old checkpoints loadable after a schema gains
    /// a field.
    #[must_use]
    pub fn from_persisted(
        schema: Arc<StateSchema>,
        mut values: FxHashMap<String, Value>,
        versions: &FxHashMap<String, u32>,
    ) -> Self {
        let channels = schema
            .fields()
            .map(|f| ValueChannel {
                value: values
                    .remove(f.name())
                    .unwrap_or_else(|| f.default_value().clone()),
                version: versions.get(f.name()).copied().unwrap_or(1),
            })
            .collect();
        Self { schema, channels }
    }

    /// The schema this state was materialized from.
    #[must_use]
    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    /// Current value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.channel(name).map(|c| &c.value)
    }

    /// Current version of a field.
    #[must_use]
    pub fn version(&self, name: &str) -> Option<u32> {
        self.channel(name).map(|c| c.version)
    }

    /// Mutable access to a field's value.
    ///
    /// Versions are not touched; the barrier owns version accounting.
    pub fn value_mut(&mut self, name: &str) -> Option<&mut Value> {
        let idx = *self.schema.index.get(name)?;
        Some(&mut self.channels[idx].value)
    }

    /// Overwrite a field's version (barrier/restore use only).
    pub(crate) fn set_version(&mut self, name: &str, version: u32) {
        if let Some(&idx) = self.schema.index.get(name) {
            self.channels[idx].version = version;
        }
    }

    /// Clone out all field values keyed by name.
    #[must_use]
    pub fn values_map(&self) -> FxHashMap<String, Value> {
        self.schema
            .fields()
            .zip(&self.channels)
            .map(|(f, c)| (f.name().to_string(), c.value.clone()))
            .collect()
    }

    /// Clone out all field versions keyed by name.
    #[must_use]
    pub fn versions_map(&self) -> FxHashMap<String, u32> {
        self.schema
            .fields()
            .zip(&self.channels)
            .map(|(f, c)| (f.name().to_string(), c.version))
            .collect()
    }

    /// Point-in-time, isolated view of the state.
    ///
    /// Snapshots clone all field values; mutations to the live state after
    /// the snapshot is taken are not visible through it.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            values: Arc::new(self.values_map()),
            versions: Arc::new(self.versions_map()),
            order: Arc::new(self.schema.field_names().cloned().collect()),
        }
    }

    fn channel(&self, name: &str) -> Option<&ValueChannel> {
        self.schema.index.get(name).map(|&i| &self.channels[i])
    }
}

/// Immutable snapshot of workflow state at a specific point in time.
///
/// Cheap to clone (shared internals) and safe to hand to concurrently
/// running node invocations: no node can observe another node's output
/// through a snapshot taken before the barrier.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    values: Arc<FxHashMap<String, Value>>,
    versions: Arc<FxHashMap<String, u32>>,
    order: Arc<Vec<String>>,
}

impl StateSnapshot {
    /// Value of a field at snapshot time.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Version of a field at snapshot time.
    #[must_use]
    pub fn version(&self, name: &str) -> Option<u32> {
        self.versions.get(name).copied()
    }

    /// Iterate `(field, value)` pairs in schema declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.order
            .iter()
            .filter_map(|name| self.values.get(name).map(|v| (name, v)))
    }

    /// All field values keyed by name.
    #[must_use]
    pub fn values(&self) -> &FxHashMap<String, Value> {
        &self.values
    }

    /// Number of fields captured by this snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the snapshot captured no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
