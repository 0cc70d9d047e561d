//! Feed fingerprint (C9): a hash of everything that can change a snapshot's
//! bytes — destination, the config minus anything ephemeral (secrets,
//! feed tokens), and the sorted `(canonical_id, content_hash)` pairs of
//! every listing in scope. Unchanged fingerprint means skip the rebuild.
//!
//! Grounded on `original_source/app/services/feed_fingerprint.py` and
//! `hosted_feed.py`'s `hash_payload` construction.

use hub_common::content_hash;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct ListingSummary {
    pub canonical_id: String,
    pub content_hash: String,
}

/// `config` should already have ephemeral/secret keys stripped by the
/// caller (e.g. `feed_token`) — this function does not redact, it only
/// hashes what it's given, matching the original's explicit allowlist
/// (`{"area_id_map": cfg.get("area_id_map", {})}`) rather than a blanket
/// redaction pass.
pub fn compute_fingerprint(
    destination: &str,
    format: &str,
    config: &serde_json::Value,
    listings: &[ListingSummary],
) -> String {
    let mut sorted: Vec<&ListingSummary> = listings.iter().collect();
    sorted.sort_by(|a, b| a.canonical_id.cmp(&b.canonical_id));

    let payload = json!({
        "destination": destination,
        "format": format,
        "config": config,
        "listings": sorted
            .iter()
            .map(|l| json!({"canonical_id": l.canonical_id, "content_hash": l.content_hash}))
            .collect::<Vec<_>>(),
    });

    content_hash(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_stable_under_input_reordering() {
        let a = vec![
            ListingSummary { canonical_id: "b".into(), content_hash: "2".into() },
            ListingSummary { canonical_id: "a".into(), content_hash: "1".into() },
        ];
        let b = vec![
            ListingSummary { canonical_id: "a".into(), content_hash: "1".into() },
            ListingSummary { canonical_id: "b".into(), content_hash: "2".into() },
        ];
        let cfg = json!({});
        assert_eq!(
            compute_fingerprint("dest", "xml", &cfg, &a),
            compute_fingerprint("dest", "xml", &cfg, &b),
        );
    }

    #[test]
    fn fingerprint_changes_with_content_hash() {
        let cfg = json!({});
        let a = vec![ListingSummary { canonical_id: "a".into(), content_hash: "1".into() }];
        let b = vec![ListingSummary { canonical_id: "a".into(), content_hash: "2".into() }];
        assert_ne!(
            compute_fingerprint("dest", "xml", &cfg, &a),
            compute_fingerprint("dest", "xml", &cfg, &b),
        );
    }
}
