//! Deterministic JSON hashing shared by the canonical validator, the
//! idempotency store, and the feed fingerprint.

use sha2::{Digest, Sha256};

/// Serialize `value` with sorted keys and compact separators. `serde_json`
/// already emits object keys in insertion order for `serde_json::Value`, so
/// we rebuild through a `BTreeMap` at every object level to force sort order,
/// matching the Python original's `json.dumps(..., sort_keys=True)`.
pub fn stable_json(value: &serde_json::Value) -> String {
    serde_json::to_string(&sort_value(value)).expect("Value serialization cannot fail")
}

fn sort_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            serde_json::to_value(sorted).expect("BTreeMap<String, Value> always serializes")
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_value).collect())
        }
        other => other.clone(),
    }
}

/// Hex-encoded SHA-256 of a UTF-8 string.
pub fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a JSON value via `stable_json` + `sha256_hex` in one call. This is
/// the content-hash primitive reused by the canonical validator (listing
/// `content_hash`), the idempotency store (`request_hash`), and the feed
/// engine (fingerprint components).
pub fn content_hash(value: &serde_json::Value) -> String {
    sha256_hex(&stable_json(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_stable_under_key_reordering() {
        let a = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let b = json!({"a": 2, "c": {"y": 2, "z": 1}, "b": 1});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_differs_on_value_change() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    proptest::proptest! {
        #[test]
        fn hash_idempotent_under_renormalization(a in 0i64..1000, b in 0i64..1000) {
            let v = json!({"a": a, "b": b});
            let h1 = content_hash(&v);
            let renormalized: serde_json::Value =
                serde_json::from_str(&stable_json(&v)).unwrap();
            let h2 = content_hash(&renormalized);
            prop_assert_eq!(h1, h2);
        }
    }
}
