//! Argument normalization.
//!
//! A thunk returns whatever shape is convenient for its caller: a bare list of
//! positional arguments, or a record with `positional` and/or `named` members.
//! The capitalized `Positional` / `Named` schema used by signature-style type
//! definitions is accepted too. Everything is folded into one canonical
//! [`Args`] value.
//!
//! Malformed shapes never fail: a missing or mistyped member falls back to its
//! empty default.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// A zero-argument function producing the current arguments of a resource.
pub type Thunk = Arc<dyn Fn() -> Value + Send + Sync>;

/// Wrap a closure as a [`Thunk`].
pub fn thunk<F>(f: F) -> Thunk
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Canonical resource arguments.
///
/// Named arguments compare equal regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    #[serde(default)]
    pub positional: Vec<Value>,
    #[serde(default)]
    pub named: IndexMap<String, Value>,
}

impl Args {
    /// Empty arguments.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Positional argument `index`, if present.
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Named argument `key`, if present.
    pub fn named(&self, key: &str) -> Option<&Value> {
        self.named.get(key)
    }

    /// Positional argument `index` deserialized as `T`.
    ///
    /// Returns `None` when the argument is missing or has the wrong shape.
    pub fn positional_as<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        self.positional(index)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Named argument `key` deserialized as `T`.
    pub fn named_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.named(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Whether there are neither positional nor named arguments.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

fn positional_from(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            trace!(?other, "positional args are not a list, using empty default");
            Vec::new()
        }
    }
}

fn named_from(value: Option<Value>) -> IndexMap<String, Value> {
    match value {
        Some(Value::Object(map)) => map.into_iter().collect(),
        None | Some(Value::Null) => IndexMap::new(),
        Some(other) => {
            trace!(?other, "named args are not a record, using empty default");
            IndexMap::new()
        }
    }
}

/// Fold a thunk result into canonical [`Args`].
pub fn normalize(raw: Value) -> Args {
    match raw {
        Value::Array(items) => Args {
            positional: items,
            named: IndexMap::new(),
        },
        Value::Object(mut record) => {
            let (positional, named) =
                if record.contains_key("positional") || record.contains_key("named") {
                    (record.remove("positional"), record.remove("named"))
                } else {
                    (record.remove("Positional"), record.remove("Named"))
                };
            Args {
                positional: positional_from(positional),
                named: named_from(named),
            }
        }
        Value::Null => Args::empty(),
        other => {
            trace!(?other, "thunk returned neither a list nor a record, using empty args");
            Args::empty()
        }
    }
}

/// Invoke `thunk` (if any) and normalize its result.
///
/// With no thunk the result is empty args.
pub fn normalize_thunk(thunk: Option<&Thunk>) -> Args {
    match thunk {
        Some(thunk) => normalize(thunk()),
        None => Args::empty(),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn list_is_positional() {
        let args = normalize(json!([1, 2]));
        assert_eq!(args.positional, vec![json!(1), json!(2)]);
        assert!(args.named.is_empty());
    }

    #[test]
    fn canonical_record_is_unchanged() {
        let args = normalize(json!({ "positional": [1], "named": { "a": 2 } }));
        assert_eq!(
            args,
            Args {
                positional: vec![json!(1)],
                named: named(&[("a", json!(2))]),
            }
        );
    }

    #[test]
    fn capitalized_schema_is_accepted() {
        let args = normalize(json!({ "Positional": [1], "Named": { "a": 2 } }));
        assert_eq!(args.positional, vec![json!(1)]);
        assert_eq!(args.named("a"), Some(&json!(2)));
    }

    #[test]
    fn lower_case_schema_wins_when_both_are_present() {
        let args = normalize(json!({ "named": { "a": 1 }, "Positional": [9] }));
        assert!(args.positional.is_empty());
        assert_eq!(args.named_as::<i64>("a"), Some(1));
    }

    #[test]
    fn missing_thunk_is_empty_args() {
        assert_eq!(normalize_thunk(None), Args::empty());
    }

    #[test]
    fn thunk_is_invoked() {
        let t = thunk(|| json!([3]));
        assert_eq!(normalize_thunk(Some(&t)).positional_as::<i64>(0), Some(3));
    }

    #[test]
    fn either_part_may_be_omitted() {
        let only_named = normalize(json!({ "named": { "x": true } }));
        assert!(only_named.positional.is_empty());
        assert_eq!(only_named.named_as::<bool>("x"), Some(true));

        let only_positional = normalize(json!({ "positional": ["a"] }));
        assert_eq!(only_positional.positional_as::<String>(0).as_deref(), Some("a"));
        assert!(only_positional.named.is_empty());
    }

    #[test]
    fn unknown_members_are_ignored() {
        let args = normalize(json!({ "positional": [1], "extra": 5 }));
        assert_eq!(args.positional, vec![json!(1)]);
        assert!(args.named.is_empty());
    }

    #[test]
    fn malformed_shapes_fall_back_to_defaults() {
        assert_eq!(normalize(json!(42)), Args::empty());
        assert_eq!(normalize(json!("text")), Args::empty());
        assert_eq!(normalize(Value::Null), Args::empty());
        assert_eq!(normalize(json!({})), Args::empty());

        let mistyped = normalize(json!({ "positional": { "a": 1 }, "named": [1] }));
        assert_eq!(mistyped, Args::empty());
    }

    #[test]
    fn named_equality_ignores_order() {
        let left = normalize(json!({ "named": { "a": 1, "b": 2 } }));
        let right = Args {
            positional: Vec::new(),
            named: named(&[("b", json!(2)), ("a", json!(1))]),
        };
        assert_eq!(left, right);
    }

    #[test]
    fn typed_extraction_rejects_wrong_types() {
        let args = normalize(json!(["not a number"]));
        assert_eq!(args.positional_as::<i64>(0), None);
        assert_eq!(args.positional_as::<i64>(5), None);
    }

    #[test]
    fn args_deserialize_with_missing_members() {
        let args: Args = serde_json::from_value(json!({ "named": { "k": "v" } })).unwrap();
        assert!(args.positional.is_empty());
        assert_eq!(args.named_as::<String>("k").as_deref(), Some("v"));
    }
}
