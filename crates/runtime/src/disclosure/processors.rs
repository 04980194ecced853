//! Result processors — pure data-shrinking transforms for tool outputs.
//!
//! All three transforms are deterministic: identical inputs always produce
//! identical outputs. Data at or below the configured limit passes through
//! unchanged.

use serde_json::Value;

/// Marker appended to truncated data.
pub const DEFAULT_MARKER: &str = "…[truncated]";

/// Cut `value` down to `max_size` units, suffixing with `marker`.
///
/// - strings: cut to `max_size` *characters* (never inside a multi-byte
///   char) and suffixed with the marker
/// - arrays: cut to `max_size` items plus a trailing marker element,
///   recursing into the kept items
/// - objects: cut to `max_size` keys plus a `__truncated__: marker` entry,
///   recursing into the kept values
/// - everything else, and data already within the limit at every level:
///   identity
///
/// Recursion matters because tool outcomes are normalized into objects: a
/// long text result arrives as `{"result": "<text>"}` and the bound must
/// reach the nested string.
pub fn truncate(value: &Value, max_size: usize, marker: &str) -> Value {
    debug_assert!(max_size > 0, "truncate size is validated at config time");
    match value {
        Value::String(s) => {
            if s.chars().count() <= max_size {
                return value.clone();
            }
            let mut cut: String = s.chars().take(max_size).collect();
            cut.push_str(marker);
            Value::String(cut)
        }
        Value::Array(items) => {
            let over = items.len() > max_size;
            let end = if over { max_size } else { items.len() };
            let mut kept: Vec<Value> = items[..end]
                .iter()
                .map(|v| truncate(v, max_size, marker))
                .collect();
            if over {
                kept.push(Value::String(marker.to_string()));
            }
            Value::Array(kept)
        }
        Value::Object(map) => {
            let over = map.len() > max_size;
            let take = if over { max_size } else { map.len() };
            let mut kept = serde_json::Map::new();
            for (k, v) in map.iter().take(take) {
                kept.insert(k.clone(), truncate(v, max_size, marker));
            }
            if over {
                kept.insert("__truncated__".into(), Value::String(marker.to_string()));
            }
            Value::Object(kept)
        }
        other => other.clone(),
    }
}

/// Reduce structured data to a small set of descriptive fields.
///
/// Applies only to complex payloads (objects/arrays); scalars pass
/// through. The summary keeps enough shape information (counts, key names)
/// for the model to decide a next action.
pub fn summarize(value: &Value) -> Value {
    match value {
        Value::Object(map) => serde_json::json!({
            "type": "object",
            "size": map.len(),
            "keys": map.keys().cloned().collect::<Vec<_>>(),
        }),
        Value::Array(items) => serde_json::json!({
            "type": "array",
            "length": items.len(),
        }),
        other => other.clone(),
    }
}

/// Keep the first `n` elements of a sequence.
///
/// Deterministic and reproducible: no randomness, so output is stable for
/// identical input and `n`. Non-arrays pass through.
pub fn sample(value: &Value, n: usize) -> Value {
    match value {
        Value::Array(items) if items.len() > n => Value::Array(items[..n].to_vec()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_string_respects_bound() {
        let long = Value::String("a".repeat(100));
        let out = truncate(&long, 10, DEFAULT_MARKER);
        let s = out.as_str().unwrap();
        assert!(s.chars().count() <= 10 + DEFAULT_MARKER.chars().count());
        assert!(s.ends_with(DEFAULT_MARKER));
    }

    #[test]
    fn truncate_is_identity_below_threshold() {
        let short = Value::String("hello".into());
        assert_eq!(truncate(&short, 10, DEFAULT_MARKER), short);
        let exact = Value::String("exact".into());
        assert_eq!(truncate(&exact, 5, DEFAULT_MARKER), exact);
    }

    #[test]
    fn truncate_never_splits_multibyte_chars() {
        let text = Value::String("héllo wörld — ünïcode tëxt".into());
        let out = truncate(&text, 7, "...");
        let s = out.as_str().unwrap();
        assert!(s.starts_with("héllo w"));
        assert!(s.ends_with("..."));
    }

    #[test]
    fn truncate_array_appends_marker_element() {
        let arr = serde_json::json!([1, 2, 3, 4, 5]);
        let out = truncate(&arr, 3, DEFAULT_MARKER);
        let items = out.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[2], 3);
        assert_eq!(items[3], Value::String(DEFAULT_MARKER.into()));
    }

    #[test]
    fn truncate_object_adds_truncated_entry() {
        let obj = serde_json::json!({"a": 1, "b": 2, "c": 3, "d": 4});
        let out = truncate(&obj, 2, DEFAULT_MARKER);
        let map = out.as_object().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["__truncated__"], Value::String(DEFAULT_MARKER.into()));
    }

    #[test]
    fn truncate_reaches_nested_strings() {
        // The normalized tool-outcome shape: one key, huge string value
        let obj = serde_json::json!({"result": "a".repeat(500)});
        let out = truncate(&obj, 10, DEFAULT_MARKER);
        let s = out["result"].as_str().unwrap();
        assert!(s.chars().count() <= 10 + DEFAULT_MARKER.chars().count());
        assert!(s.ends_with(DEFAULT_MARKER));
        assert!(out.as_object().unwrap().get("__truncated__").is_none());
    }

    #[test]
    fn truncate_recurses_into_kept_array_items() {
        let arr = serde_json::json!(["x".repeat(50), "short", {"k": "y".repeat(50)}]);
        let out = truncate(&arr, 5, DEFAULT_MARKER);
        let items = out.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[0].as_str().unwrap().ends_with(DEFAULT_MARKER));
        assert_eq!(items[1], "short");
        assert!(items[2]["k"].as_str().unwrap().ends_with(DEFAULT_MARKER));
    }

    #[test]
    fn truncate_is_identity_for_nested_data_within_limit() {
        let obj = serde_json::json!({"a": "tiny", "b": [1, 2], "c": {"d": "ok"}});
        assert_eq!(truncate(&obj, 10, DEFAULT_MARKER), obj);
    }

    #[test]
    fn truncate_passes_scalars_through() {
        assert_eq!(truncate(&serde_json::json!(42), 1, DEFAULT_MARKER), serde_json::json!(42));
        assert_eq!(truncate(&Value::Null, 1, DEFAULT_MARKER), Value::Null);
    }

    #[test]
    fn summarize_object_keeps_keys() {
        let obj = serde_json::json!({"rows": [1, 2], "total": 2});
        let out = summarize(&obj);
        assert_eq!(out["type"], "object");
        assert_eq!(out["size"], 2);
        let keys = out["keys"].as_array().unwrap();
        assert!(keys.contains(&Value::String("rows".into())));
    }

    #[test]
    fn summarize_array_keeps_length() {
        let arr = serde_json::json!([1, 2, 3]);
        let out = summarize(&arr);
        assert_eq!(out["type"], "array");
        assert_eq!(out["length"], 3);
    }

    #[test]
    fn summarize_passes_scalars_through() {
        let s = Value::String("plain".into());
        assert_eq!(summarize(&s), s);
    }

    #[test]
    fn sample_takes_first_n_deterministically() {
        let arr = serde_json::json!([5, 4, 3, 2, 1]);
        let a = sample(&arr, 3);
        let b = sample(&arr, 3);
        assert_eq!(a, serde_json::json!([5, 4, 3]));
        assert_eq!(a, b);
    }

    #[test]
    fn sample_is_identity_for_small_arrays_and_non_arrays() {
        let arr = serde_json::json!([1, 2]);
        assert_eq!(sample(&arr, 5), arr);
        let obj = serde_json::json!({"k": 1});
        assert_eq!(sample(&obj, 1), obj);
    }
}
