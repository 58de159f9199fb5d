//! Payload sanitization before business logic sees the body.
//!
//! Strips prototype-pollution key names and neutralizes script-bearing
//! URI schemes inside string values, recursively.

use serde_json::Value;

const BLOCKED_KEY_FRAGMENTS: &[&str] = &["__proto__", "constructor", "prototype", "<script"];
const BLOCKED_SUBSTRINGS: &[&str] = &["javascript:", "data:text/html"];

/// Returns a sanitized copy of `value`.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !is_blocked_key(key))
                .map(|(key, child)| (key, sanitize(child)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::String(s) => Value::String(scrub_string(s)),
        other => other,
    }
}

fn is_blocked_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    BLOCKED_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

fn scrub_string(s: String) -> String {
    // Remove each occurrence case-insensitively, preserving surrounding text.
    // Offsets come from scanning the original string, never a lowercased copy,
    // so multibyte characters ahead of a match cannot skew the splice range.
    let mut result = s;
    for needle in BLOCKED_SUBSTRINGS {
        while let Some(start) = find_ascii_case_insensitive(&result, needle) {
            result.replace_range(start..start + needle.len(), "");
        }
    }
    result
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        bytes
            .get(i..i + needle.len())
            .is_some_and(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
    })
}
