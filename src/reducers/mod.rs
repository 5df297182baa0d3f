//! State merge strategies applied at the super-step barrier.
//!
//! Every state field declares a reducer that reconciles node updates into
//! the shared state. Reducers never bump channel versions; version
//! accounting happens at the barrier after all updates are applied.
//!
//! Built-in strategies:
//! - [`LastValue`]: last write wins (the default)
//! - [`Append`]: accumulate updates into a JSON array
//! - [`Sum`]: numeric addition
//!
//! Custom strategies plug in through [`ReducerSpec::Custom`].
//!
//! # Ordering constraint
//!
//! Updates from nodes that ran concurrently in one super-step are applied
//! in frontier order, which is deterministic for a given graph — but the
//! completion order of the underlying tasks is not. Fields written by
//! dynamic fan-out tasks must therefore use an associative, commutative
//! reducer such as [`Append`] or [`Sum`].

mod builtin;
mod reducer_registry;

pub use builtin::{Append, LastValue, Sum};
pub use reducer_registry::ReducerRegistry;

use miette::Diagnostic;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Merge a single node update into the current value of one state field.
pub trait Reducer: Send + Sync {
    /// Fold `update` into `current` in place.
    fn apply(&self, current: &mut Value, update: Value);
}

/// Declares which reducer a state field uses.
///
/// # Examples
///
/// ```rust
/// use plait::reducers::ReducerSpec;
/// use plait::state::StateSchema;
///
/// let schema = StateSchema::builder()
///     .field("answer", ReducerSpec::LastValue)
///     .field("notes", ReducerSpec::Append)
///     .field("count", ReducerSpec::Sum)
///     .build();
/// assert_eq!(schema.field_names().count(), 3);
/// ```
#[derive(Clone)]
pub enum ReducerSpec {
    /// Replace the current value with the update.
    LastValue,
    /// Accumulate updates into a JSON array. Array updates are
    /// concatenated, scalar updates are pushed.
    Append,
    /// Add numeric updates to the current value.
    Sum,
    /// Application-provided merge strategy.
    Custom(Arc<dyn Reducer>),
}

impl ReducerSpec {
    /// Materialize the reducer implementation for this spec.
    #[must_use]
    pub fn reducer(&self) -> Arc<dyn Reducer> {
        match self {
            ReducerSpec::LastValue => Arc::new(LastValue),
            ReducerSpec::Append => Arc::new(Append),
            ReducerSpec::Sum => Arc::new(Sum),
            ReducerSpec::Custom(reducer) => Arc::clone(reducer),
        }
    }

    /// Default seed value for fields using this reducer.
    ///
    /// Append fields start as an empty array so fan-out results always have
    /// something to accumulate into; everything else starts as `null`.
    #[must_use]
    pub fn initial_value(&self) -> Value {
        match self {
            ReducerSpec::Append => Value::Array(Vec::new()),
            _ => Value::Null,
        }
    }
}

impl fmt::Debug for ReducerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerSpec::LastValue => write!(f, "LastValue"),
            ReducerSpec::Append => write!(f, "Append"),
            ReducerSpec::Sum => write!(f, "Sum"),
            ReducerSpec::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Errors raised while applying reducers at the barrier.
#[derive(Debug, Error, Diagnostic)]
pub enum ReducerError {
    /// A node update referenced a field the schema does not declare.
    #[error("no state field named `{field}` is declared in the schema")]
    #[diagnostic(
        code(plait::reducers::unknown_field),
        help("Declare the field on the schema before compiling the graph.")
    )]
    UnknownField { field: String },
}
