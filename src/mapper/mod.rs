//! Object mapping.
//!
//! Bidirectional conversion between nested value-object maps and flat,
//! prefixed column maps, plus the row-level encode/decode used on every
//! boundary crossing: entity rows and collection junction rows.
//!
//! For any value-shaped map `v`, prefix `p` and row `r` free of `p`'s
//! namespace: `reconstruct(p, merge(r, flatten(p, v))) == v`.

pub mod convert;
pub mod rows;

pub use convert::{json_to_value, value_to_json};

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

pub type JsonMap = serde_json::Map<String, JsonValue>;

/// Flattens a nested value map into prefixed columns.
///
/// Nested maps recurse with `{prefix}_{key}`; every other value, `null`
/// included, becomes a leaf under `{prefix}_{key}`. Non-map, non-scalar
/// values (a raw list) pass through unprefixed: such shapes only occur for
/// collection fields, which are reified into their own tables rather than
/// flattened.
pub fn flatten(prefix: &str, value: &JsonMap) -> JsonMap {
    let mut row = JsonMap::new();
    flatten_into(prefix, value, &mut row);
    row
}

fn flatten_into(prefix: &str, value: &JsonMap, row: &mut JsonMap) {
    for (key, item) in value {
        match item {
            JsonValue::Object(inner) => flatten_into(&join_prefix(prefix, key), inner, row),
            JsonValue::Array(_) => {
                row.insert(key.clone(), item.clone());
            }
            other => {
                row.insert(join_prefix(prefix, key), other.clone());
            }
        }
    }
}

/// Inverse of [`flatten`]: selects every `{prefix}_` key in the row, strips
/// the prefix, and re-nests by `_`-separated segments.
pub fn reconstruct(prefix: &str, row: &JsonMap) -> JsonMap {
    let marker = format!("{}_", prefix);
    let mut stripped = Vec::new();
    for (key, value) in row {
        if prefix.is_empty() {
            stripped.push((key.clone(), value.clone()));
        } else if let Some(rest) = key.strip_prefix(&marker) {
            stripped.push((rest.to_string(), value.clone()));
        }
    }
    nest(stripped)
}

fn nest(entries: Vec<(String, JsonValue)>) -> JsonMap {
    let mut result = JsonMap::new();
    let mut groups: BTreeMap<String, Vec<(String, JsonValue)>> = BTreeMap::new();

    for (key, value) in entries {
        match key.split_once('_') {
            None => {
                result.insert(key, value);
            }
            Some((head, rest)) => groups
                .entry(head.to_string())
                .or_default()
                .push((rest.to_string(), value)),
        }
    }

    for (head, inner) in groups {
        result.insert(head, JsonValue::Object(nest(inner)));
    }

    result
}

pub(crate) fn join_prefix(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}_{}", prefix, key)
    }
}
