//! Right-biased deep merge of spec document trees.
//!
//! Used by the reference resolver to stack parent documents: for each key,
//! the later document wins; maps merge key-by-key, everything else (scalars
//! and lists) is replaced wholesale. A map meeting a non-map at the same key
//! is a type conflict, regardless of which side holds the map.

use serde_json::Value;

use crate::{Result, SpecflowError};

/// Merge `overlay` on top of `base` and return the combined tree.
pub fn deep_merge(
    base: Value,
    overlay: Value,
) -> Result<Value> {
    merge_at(base, overlay, "")
}

fn merge_at(
    base: Value,
    overlay: Value,
    path: &str,
) -> Result<Value> {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_at(base_value, overlay_value, &child_path)?,
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Ok(Value::Object(base_map))
        }
        (base, overlay) => {
            // Exactly one side being a map is a conflict; two non-maps
            // replace right over left.
            if base.is_object() || overlay.is_object() {
                return Err(SpecflowError::MergeType {
                    key: path.to_string(),
                    left: type_name(&base).to_string(),
                    right: type_name(&overlay).to_string(),
                });
            }
            Ok(overlay)
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_merge_is_right_biased_at_depth() {
        let merged = deep_merge(json!({"a": {"x": 1}}), json!({"a": {"x": 2, "y": 3}})).unwrap();
        assert_eq!(merged, json!({"a": {"x": 2, "y": 3}}));
    }

    #[test]
    fn test_lists_replace_not_concatenate() {
        let merged = deep_merge(json!({"tags": [1, 2]}), json!({"tags": [3]})).unwrap();
        assert_eq!(merged, json!({"tags": [3]}));
    }

    #[test]
    fn test_scalar_replaces_scalar() {
        let merged = deep_merge(json!({"n": 1, "keep": true}), json!({"n": "two"})).unwrap();
        assert_eq!(merged, json!({"n": "two", "keep": true}));
    }

    #[test]
    fn test_map_into_non_map_conflicts_both_ways() {
        let err = deep_merge(json!({"a": {"x": 1}}), json!({"a": 5})).unwrap_err();
        assert_eq!(
            err,
            SpecflowError::MergeType {
                key: "a".to_string(),
                left: "map".to_string(),
                right: "number".to_string(),
            }
        );

        let err = deep_merge(json!({"a": 5}), json!({"a": {"x": 1}})).unwrap_err();
        assert_eq!(
            err,
            SpecflowError::MergeType {
                key: "a".to_string(),
                left: "number".to_string(),
                right: "map".to_string(),
            }
        );
    }

    #[test]
    fn test_conflict_reports_nested_key_path() {
        let err = deep_merge(json!({"a": {"b": {"c": 1}}}), json!({"a": {"b": {"c": {"d": 2}}}})).unwrap_err();
        match err {
            SpecflowError::MergeType { key, .. } => assert_eq!(key, "a.b.c"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_disjoint_keys_union() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2})).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }
}
