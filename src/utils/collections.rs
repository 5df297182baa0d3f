//! Collection constructors shared across the crate.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Fresh update map for node partials and run inputs.
#[must_use]
pub fn new_update_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}

/// Build an update map from `(field, value)` pairs.
///
/// ```rust
/// use plait::utils::collections::update_map;
/// use serde_json::json;
///
/// let input = update_map([("topic", json!("geese")), ("count", json!(0))]);
/// assert_eq!(input.len(), 2);
/// ```
#[must_use]
pub fn update_map<K, I>(pairs: I) -> FxHashMap<String, Value>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v))
        .collect()
}
