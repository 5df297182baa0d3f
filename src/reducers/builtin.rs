use serde_json::Value;

use super::Reducer;

/// Last write wins: the update replaces the current value.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct LastValue;

impl Reducer for LastValue {
    fn apply(&self, current: &mut Value, update: Value) {
        *current = update;
    }
}

/// Accumulates updates into a JSON array.
///
/// Array updates are concatenated; scalar updates are pushed. A current
/// value that is not yet an array (e.g. `null` after a last-value write)
/// is promoted to a singleton array first. Associative and commutative
/// over multisets of elements, which makes it safe for fan-out fields.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct Append;

impl Reducer for Append {
    fn apply(&self, current: &mut Value, update: Value) {
        if !current.is_array() {
            let seed = match current.take() {
                Value::Null => Vec::new(),
                other => vec![other],
            };
            *current = Value::Array(seed);
        }
        let items = current
            .as_array_mut()
            .expect("current promoted to array above");
        match update {
            Value::Array(mut incoming) => items.append(&mut incoming),
            other => items.push(other),
        }
    }
}

/// Adds numeric updates to the current value.
///
/// Integer pairs stay integral; any float operand promotes the result to a
/// float. Non-numeric operands fall back to last-value semantics so a
/// misbehaving node cannot wedge the merge.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct Sum;

impl Reducer for Sum {
    fn apply(&self, current: &mut Value, update: Value) {
        let merged = match (current.as_i64(), update.as_i64()) {
            (Some(a), Some(b)) => Some(Value::from(a + b)),
            _ => match (current.as_f64(), update.as_f64()) {
                (Some(a), Some(b)) => Some(Value::from(a + b)),
                _ => None,
            },
        };
        *current = match merged {
            Some(v) => v,
            // One side is non-numeric: treat null as identity, otherwise
            // take the update.
            None if update.is_null() => current.take(),
            None => update,
        };
    }
}
