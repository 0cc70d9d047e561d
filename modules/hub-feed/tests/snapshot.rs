//! Hosted feed snapshot builder (C9) against a real Postgres plus a
//! tempfile-backed local object store: unchanged listings skip the rebuild,
//! a changed listing set produces a new snapshot with both a plain and a
//! gzip artifact on disk.

use hub_catalog::MappingStore;
use hub_core::canonical::validate_canonical;
use hub_feed::object_store::LocalObjectStore;
use hub_feed::plugin::FeedPluginRegistry;
use hub_feed::snapshot::{FeedSnapshotStore, SnapshotBuildOutcome};
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_scope(pool: &PgPool) -> (Uuid, Uuid) {
    let tenant_id: Uuid = sqlx::query_scalar("INSERT INTO tenants (name) VALUES ('acme') RETURNING id")
        .fetch_one(pool)
        .await
        .unwrap();
    let partner_id: Uuid = sqlx::query_scalar(
        "INSERT INTO partners (tenant_id, partner_key, name) VALUES ($1, 'acme', 'Acme') RETURNING id",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await
    .unwrap();
    (tenant_id, partner_id)
}

fn listing(id: &str, title: &str) -> hub_core::ListingCanonicalV1 {
    validate_canonical(&serde_json::json!({
        "canonical_id": id,
        "purpose": "sale",
        "title": title,
        "list_price": {"currency": "GBP", "amount": 250000},
        "address": {"city": "Istanbul", "area": "Besiktas"},
    }))
    .unwrap()
}

#[tokio::test]
async fn unchanged_listing_set_skips_rebuild_and_changed_set_produces_new_artifacts() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let (tenant_id, partner_id) = seed_scope(&pool).await;

    let store = FeedSnapshotStore::new(pool.clone());
    let registry = FeedPluginRegistry::new();
    let mappings = MappingStore::new(pool.clone());
    let dir = tempfile::tempdir().unwrap();
    let object_store = LocalObjectStore::new(dir.path()).unwrap();

    let listings = vec![(listing("lst_1", "Nice flat"), "hash-1".to_string())];

    let first = store
        .build_snapshot(
            &registry,
            &mappings,
            &object_store,
            tenant_id,
            partner_id,
            "xml_v1",
            &serde_json::json!({}),
            listings.clone(),
            Vec::new(),
        )
        .await
        .unwrap();
    let first_snapshot = match first {
        SnapshotBuildOutcome::Rebuilt { snapshot } => snapshot,
        SnapshotBuildOutcome::Unchanged { .. } => panic!("first build must rebuild"),
    };
    assert_eq!(first_snapshot.listing_count, 1);
    assert!(first_snapshot.gzip_storage_uri.is_some());

    let raw = std::fs::read(object_store.resolve_path(&first_snapshot.storage_uri).unwrap()).unwrap();
    assert!(!raw.is_empty());
    let gz_path = object_store
        .resolve_path(first_snapshot.gzip_storage_uri.as_deref().unwrap())
        .unwrap();
    assert!(gz_path.exists());

    // Same listings, same content hashes: fingerprint is unchanged, no rebuild.
    let second = store
        .build_snapshot(
            &registry,
            &mappings,
            &object_store,
            tenant_id,
            partner_id,
            "xml_v1",
            &serde_json::json!({}),
            listings.clone(),
            Vec::new(),
        )
        .await
        .unwrap();
    match second {
        SnapshotBuildOutcome::Unchanged { snapshot } => assert_eq!(snapshot.id, first_snapshot.id),
        SnapshotBuildOutcome::Rebuilt { .. } => panic!("unchanged listing set must not rebuild"),
    }

    // A changed content hash moves the fingerprint: new snapshot row.
    let changed_listings = vec![(listing("lst_1", "Nice flat"), "hash-2".to_string())];
    let third = store
        .build_snapshot(
            &registry,
            &mappings,
            &object_store,
            tenant_id,
            partner_id,
            "xml_v1",
            &serde_json::json!({}),
            changed_listings,
            Vec::new(),
        )
        .await
        .unwrap();
    match third {
        SnapshotBuildOutcome::Rebuilt { snapshot } => assert_ne!(snapshot.id, first_snapshot.id),
        SnapshotBuildOutcome::Unchanged { .. } => panic!("changed content hash must rebuild"),
    }

    let count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM feed_snapshots WHERE partner_id = $1 AND destination = 'xml_v1'",
    )
    .bind(partner_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn unmapped_area_on_named_destination_warns_but_still_builds() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let (tenant_id, partner_id) = seed_scope(&pool).await;

    let store = FeedSnapshotStore::new(pool.clone());
    let registry = FeedPluginRegistry::new();
    let mappings = MappingStore::new(pool.clone());
    let dir = tempfile::tempdir().unwrap();
    let object_store = LocalObjectStore::new(dir.path()).unwrap();

    let listings = vec![(listing("lst_2", "Flat with no area mapping"), "hash-1".to_string())];

    let outcome = store
        .build_snapshot(
            &registry,
            &mappings,
            &object_store,
            tenant_id,
            partner_id,
            "101evler",
            &serde_json::json!({}),
            listings,
            Vec::new(),
        )
        .await
        .unwrap();

    match outcome {
        SnapshotBuildOutcome::Rebuilt { snapshot } => {
            assert_eq!(snapshot.listing_count, 1);
            let warnings = snapshot.meta["warnings"].as_array().unwrap();
            assert_eq!(warnings.len(), 1);
            assert_eq!(warnings[0]["code"], "UNMAPPED_AREA");
        }
        SnapshotBuildOutcome::Unchanged { .. } => panic!("first build must rebuild"),
    }
}
