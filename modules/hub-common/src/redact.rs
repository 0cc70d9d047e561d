//! Recursive payload redaction before anything touches durable storage.
//!
//! Grounded on `original_source/app/services/redaction.py`: any object key
//! matching the sensitive-key set (case-insensitive) has its value replaced
//! with a fixed sentinel, recursively through nested objects and arrays.

use serde_json::Value;

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "pass",
    "pwd",
    "secret",
    "client_secret",
    "token",
    "access_token",
    "refresh_token",
    "api_key",
    "apikey",
    "authorization",
    "auth",
];

const SENTINEL: &str = "[REDACTED]";

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|k| *k == lower)
}

/// Return a redacted copy of `value`. Non-object/array leaves pass through.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_sensitive_key(k) {
                    out.insert(k.clone(), Value::String(SENTINEL.to_string()));
                } else {
                    out.insert(k.clone(), redact(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_nested_and_case_insensitive_keys() {
        let input = json!({
            "title": "nice flat",
            "Agent": {"Password": "hunter2", "phone": "+44123"},
            "tokens": [{"access_token": "abc"}, {"other": "keep"}],
        });
        let out = redact(&input);
        assert_eq!(out["title"], json!("nice flat"));
        assert_eq!(out["Agent"]["Password"], json!("[REDACTED]"));
        assert_eq!(out["Agent"]["phone"], json!("+44123"));
        assert_eq!(out["tokens"][0]["access_token"], json!("[REDACTED]"));
        assert_eq!(out["tokens"][1]["other"], json!("keep"));
    }

    #[test]
    fn leaves_non_sensitive_payload_untouched() {
        let input = json!({"a": {"b": {"c": 1}}});
        assert_eq!(redact(&input), input);
    }
}
