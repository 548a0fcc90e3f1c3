//! Dotted-path access into nested JSON values.
//!
//! `a.b.0.c` walks object keys and, where the current value is an array,
//! numeric segments as indices.

use serde_json::{Map, Value};
use thiserror::Error;

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Read the value at `path`. Returns `None` when any segment is missing.
pub fn get_value_from_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(root);
    }

    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) if is_index(segment) => {
            segment.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    })
}

/// Largest array index a write may create.
pub const MAX_ARRAY_INDEX: usize = 10_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PathError {
    #[error("array index '{0}' exceeds the limit of {MAX_ARRAY_INDEX}")]
    IndexTooLarge(String),
}

/// Write `value` at `path`, creating intermediate containers on the way.
///
/// A missing intermediate becomes an array when the following segment is
/// numeric and an object otherwise. Scalars in the way are replaced. Arrays
/// are padded with `null` up to the written index.
pub fn set_value_at_path(root: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let segments: Vec<&str> = path.trim().split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for (i, segment) in parents.iter().enumerate() {
        let next_is_index = is_index(segments[i + 1]);
        current = child_mut(current, segment, next_is_index)?;
    }

    *slot_mut(current, last)? = value;
    Ok(())
}

/// Step into `segment`, materialising it if absent.
fn child_mut<'a>(
    current: &'a mut Value,
    segment: &str,
    next_is_index: bool,
) -> Result<&'a mut Value, PathError> {
    let slot = slot_mut(current, segment)?;
    if !slot.is_object() && !slot.is_array() {
        *slot = if next_is_index {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }
    Ok(slot)
}

/// The entry for `segment` in `current`: an array element for numeric
/// segments into arrays, an object field otherwise.
fn slot_mut<'a>(current: &'a mut Value, segment: &str) -> Result<&'a mut Value, PathError> {
    if current.is_array() && is_index(segment) {
        let index = segment
            .parse::<usize>()
            .ok()
            .filter(|&i| i <= MAX_ARRAY_INDEX)
            .ok_or_else(|| PathError::IndexTooLarge(segment.to_string()))?;
        let Some(items) = current.as_array_mut() else {
            unreachable!("checked is_array above");
        };
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        return Ok(&mut items[index]);
    }

    Ok(ensure_object(current)
        .entry(segment.to_string())
        .or_insert(Value::Null))
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_nested_objects_and_array_indices() {
        let data = json!({ "user": { "tags": ["a", "b"], "name": "Ana" } });
        assert_eq!(get_value_from_path(&data, "user.name"), Some(&json!("Ana")));
        assert_eq!(get_value_from_path(&data, "user.tags.1"), Some(&json!("b")));
        assert_eq!(get_value_from_path(&data, "user.tags.9"), None);
        assert_eq!(get_value_from_path(&data, "user.missing"), None);
        assert_eq!(get_value_from_path(&data, "user.name.first"), None);
    }

    #[test]
    fn set_materialises_arrays_for_numeric_segments() {
        let mut data = json!({});
        set_value_at_path(&mut data, "a.b.0.c", json!(5)).unwrap();

        assert_eq!(data, json!({ "a": { "b": [{ "c": 5 }] } }));
        assert!(data["a"]["b"].is_array());
        assert_eq!(get_value_from_path(&data, "a.b.0.c"), Some(&json!(5)));
    }

    #[test]
    fn set_pads_arrays_and_overwrites_scalars() {
        let mut data = json!({ "list": [1], "scalar": 3 });
        set_value_at_path(&mut data, "list.2", json!("x")).unwrap();
        set_value_at_path(&mut data, "scalar.inner", json!(true)).unwrap();

        assert_eq!(data["list"], json!([1, null, "x"]));
        assert_eq!(data["scalar"], json!({ "inner": true }));
    }

    #[test]
    fn set_on_top_level_key() {
        let mut data = json!({ "keep": 1 });
        set_value_at_path(&mut data, "total", json!(42)).unwrap();
        assert_eq!(data, json!({ "keep": 1, "total": 42 }));
    }

    #[test]
    fn huge_index_is_rejected_without_allocating() {
        let mut data = json!({ "keep": 1 });
        let err = set_value_at_path(&mut data, "a.99999999999", json!(1)).unwrap_err();
        assert_eq!(err, PathError::IndexTooLarge("99999999999".into()));

        let err = set_value_at_path(&mut data, "list.0.99999999999999999999999", json!(1)).unwrap_err();
        assert!(matches!(err, PathError::IndexTooLarge(_)));

        set_value_at_path(&mut data, "rows.10000", json!(true)).unwrap();
        assert_eq!(data["rows"].as_array().unwrap().len(), MAX_ARRAY_INDEX + 1);
    }
}
