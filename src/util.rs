//! Shared utility functions

use serde_json::Value;

/// Safely truncate a string to at most `max_bytes` while respecting UTF-8
/// boundaries. Used when projecting event content into timeline summaries.
pub fn truncate_utf8_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Depth of nested JSON objects. A flat object has depth 0; each level of
/// direct object nesting adds one. Values of any other type, arrays
/// included, are not descended into.
pub fn json_object_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => map
            .values()
            .map(|v| match v {
                Value::Object(_) => 1 + json_object_depth(v),
                _ => 0,
            })
            .max()
            .unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncate_respects_utf8_boundaries() {
        assert_eq!(truncate_utf8_safe("hello world", 5), "hello");
        // 3-byte characters: truncating mid-character backs off to a boundary
        assert_eq!(truncate_utf8_safe("日本語", 4), "日");
        assert_eq!(truncate_utf8_safe("", 5), "");
        assert_eq!(truncate_utf8_safe("hello", 10), "hello");
    }

    #[test]
    fn depth_of_flat_object_is_zero() {
        assert_eq!(json_object_depth(&json!({"a": 1, "b": "x"})), 0);
    }

    #[test]
    fn depth_counts_nested_objects() {
        assert_eq!(json_object_depth(&json!({"a": {"b": 1}})), 1);
        assert_eq!(
            json_object_depth(&json!({"a": {"b": {"c": {"d": {"e": 1}}}}})),
            4
        );
    }

    #[test]
    fn depth_ignores_objects_inside_arrays() {
        assert_eq!(json_object_depth(&json!({"a": [{"b": {"c": 1}}]})), 0);
        assert_eq!(json_object_depth(&json!([1, 2, 3])), 0);
        assert_eq!(
            json_object_depth(&json!({"a": {"b": [{"c": {"d": 1}}]}})),
            1
        );
    }
}
