//! Field-by-field merging of configuration tiers.
//!
//! Higher tiers override lower ones key by key. Arrays such as
//! `board.default_columns` are replaced entirely, never concatenated.

use serde_json::Value;

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans, nulls are replaced entirely
/// - If overlay is null, the base value is preserved (null means "not specified")
///
/// # Example
/// ```
/// use serde_json::json;
/// use board_engine::config::deep_merge;
///
/// let base = json!({
///     "server": { "port": 31995, "storage": "sqlite" },
///     "board": { "default_columns": ["To Do", "Done"] }
/// });
/// let overlay = json!({
///     "server": { "storage": "memory" },
///     "board": { "default_columns": ["Backlog"] }
/// });
/// let result = deep_merge(base, overlay);
/// assert_eq!(result["server"]["port"], 31995);
/// assert_eq!(result["server"]["storage"], "memory");
/// assert_eq!(result["board"]["default_columns"], json!(["Backlog"]));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        // Both are objects: merge recursively
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        // Overlay is null: preserve base (null means "not specified")
        (base, Value::Null) => base,
        // Any other case: overlay replaces base entirely
        (_, overlay) => overlay,
    }
}

/// Merge multiple values in order, with later values taking precedence.
///
/// Equivalent to folding `deep_merge` over the list.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_nested_sections() {
        let base = json!({
            "server": {"bind": "127.0.0.1", "port": 31995},
            "board": {"lock_timeout_ms": 5000}
        });
        let overlay = json!({
            "server": {"port": 8080}
        });
        let result = deep_merge(base, overlay);
        assert_eq!(
            result,
            json!({
                "server": {"bind": "127.0.0.1", "port": 8080},
                "board": {"lock_timeout_ms": 5000}
            })
        );
    }

    #[test]
    fn test_column_lists_replaced_not_merged() {
        let base = json!({"board": {"default_columns": ["To Do", "Doing", "Done"]}});
        let overlay = json!({"board": {"default_columns": ["Inbox"]}});
        let result = deep_merge(base, overlay);
        assert_eq!(result, json!({"board": {"default_columns": ["Inbox"]}}));
    }

    #[test]
    fn test_null_preserves_base() {
        // An empty YAML key (`port:`) parses as null and must not erase the default.
        let base = json!({"server": {"port": 31995, "storage": "sqlite"}});
        let overlay = json!({"server": {"port": null}});
        let result = deep_merge(base, overlay);
        assert_eq!(result, json!({"server": {"port": 31995, "storage": "sqlite"}}));
    }

    #[test]
    fn test_merge_all_later_tiers_win() {
        let tiers = vec![
            json!({"server": {"port": 1, "storage": "sqlite"}}),
            json!({"server": {"port": 2}}),
            json!({"server": {"port": 3}, "board": {"max_key_length": 16}}),
        ];
        let result = deep_merge_all(tiers);
        assert_eq!(
            result,
            json!({
                "server": {"port": 3, "storage": "sqlite"},
                "board": {"max_key_length": 16}
            })
        );
    }

    #[test]
    fn test_overlay_replaces_scalar_with_section() {
        let base = json!({"board": 42});
        let overlay = json!({"board": {"lock_timeout_ms": 10}});
        let result = deep_merge(base, overlay);
        assert_eq!(result, json!({"board": {"lock_timeout_ms": 10}}));
    }
}
