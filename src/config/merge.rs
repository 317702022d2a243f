//! Configuration layer merging
//!
//! Layers are `serde_json::Value` trees merged in precedence order:
//! - Objects: deep-merge by key
//! - Arrays: replace (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge `overlay` onto `base`.
///
/// Null in the overlay overrides the base value, so a layer can clear an
/// optional setting explicitly.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(json!({"api_version": "a"}), json!({"api_version": "b"}));
        assert_eq!(result["api_version"], "b");
    }

    #[test]
    fn test_nested_settings_merge() {
        let base = json!({
            "poll": {"initial_wait_seconds": 5, "max_attempts": 15}
        });
        let overlay = json!({
            "poll": {"max_attempts": 3}
        });
        let result = deep_merge(base, overlay);

        assert_eq!(result["poll"]["max_attempts"], 3);
        assert_eq!(result["poll"]["initial_wait_seconds"], 5);
    }

    #[test]
    fn test_array_replaced_not_concatenated() {
        let result = deep_merge(json!({"extensions": [".pdf", ".png"]}), json!({"extensions": [".tiff"]}));
        assert_eq!(result["extensions"], json!([".tiff"]));
    }

    #[test]
    fn test_null_clears_value() {
        let result = deep_merge(json!({"classifier_id": "abc"}), json!({"classifier_id": null}));
        assert!(result["classifier_id"].is_null());
    }

    #[test]
    fn test_merge_layers_precedence() {
        let builtin = json!({"endpoint": null, "manifest": {"min_files_per_category": 5}});
        let file = json!({"endpoint": "https://file.example"});
        let env = json!({"endpoint": "https://env.example"});
        let cli = json!({"manifest": {"min_files_per_category": 2}});

        let result = merge_layers(vec![builtin, file, env, cli]);

        assert_eq!(result["endpoint"], "https://env.example");
        assert_eq!(result["manifest"]["min_files_per_category"], 2);
    }
}
