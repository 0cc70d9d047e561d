//! Catalog set lifecycle (C8) against a real Postgres: draft -> preview ->
//! submit -> activate writes through to the flat mapping tables and flips
//! the active pointer; rollback re-activates a prior set for the same scope.

use hub_catalog::{CatalogSetStore, MappingStore, NewSetItem, SetItemKind};
use sqlx::PgPool;
use uuid::Uuid;

async fn active_count(pool: &PgPool, destination: &str, country_code: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT count(*) FROM destination_catalog_sets WHERE destination = $1 AND country_code = $2 AND status = 'active'",
    )
    .bind(destination)
    .bind(country_code)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_turkey(pool: &PgPool) -> (Uuid, Uuid, Uuid) {
    let country_id: Uuid =
        sqlx::query_scalar("INSERT INTO geo_countries (code, name) VALUES ('TR', 'Turkey') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
    let city_id: Uuid = sqlx::query_scalar(
        "INSERT INTO geo_cities (country_id, slug, name) VALUES ($1, 'istanbul', 'Istanbul') RETURNING id",
    )
    .bind(country_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let area_id: Uuid = sqlx::query_scalar(
        "INSERT INTO geo_areas (city_id, slug, name) VALUES ($1, 'besiktas', 'Besiktas') RETURNING id",
    )
    .bind(city_id)
    .fetch_one(pool)
    .await
    .unwrap();
    (country_id, city_id, area_id)
}

#[tokio::test]
async fn enum_set_activates_and_resolves() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let store = CatalogSetStore::new(pool.clone());
    let mappings = MappingStore::new(pool.clone());

    let set_id = store.create_draft("evler101", "").await.unwrap();
    store
        .add_item(
            set_id,
            NewSetItem {
                kind: SetItemKind::Enum,
                namespace: Some("property_type".to_string()),
                source_key_or_geo_key: "apartment".to_string(),
                destination_value: "daire".to_string(),
            },
        )
        .await
        .unwrap();

    let preview = store.preview(set_id).await.unwrap();
    assert_eq!(preview.inserted, 1);
    assert_eq!(preview.updated, 0);

    store.submit(set_id).await.unwrap();
    store.activate(set_id, "ops@example.com").await.unwrap();

    let resolved = mappings
        .resolve_enum("evler101", "property_type", "apartment")
        .await
        .unwrap();
    assert_eq!(resolved.as_deref(), Some("daire"));

    let status: String = sqlx::query_scalar("SELECT status FROM destination_catalog_sets WHERE id = $1")
        .bind(set_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "active");
}

#[tokio::test]
async fn geo_set_resolves_via_city_area_slug_and_rollback_reactivates_prior_set() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let (_country_id, _city_id, _area_id) = seed_turkey(&pool).await;
    let store = CatalogSetStore::new(pool.clone());
    let mappings = MappingStore::new(pool.clone());

    let first_set = store.create_draft("evler101", "tr").await.unwrap();
    store
        .add_item(
            first_set,
            NewSetItem {
                kind: SetItemKind::Geo,
                namespace: None,
                source_key_or_geo_key: "istanbul:besiktas".to_string(),
                destination_value: "101".to_string(),
            },
        )
        .await
        .unwrap();
    store.submit(first_set).await.unwrap();
    store.activate(first_set, "ops@example.com").await.unwrap();
    assert_eq!(active_count(&pool, "evler101", "TR").await, 1);

    let resolved = mappings.resolve_enum("evler101", "unused", "unused").await.unwrap();
    assert!(resolved.is_none());

    let active_id: Uuid = sqlx::query_scalar(
        "SELECT active_catalog_set_id FROM destination_catalog_set_active WHERE destination = 'evler101' AND country_code = 'TR'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(active_id, first_set);

    let second_set = store.create_draft("evler101", "tr").await.unwrap();
    store
        .add_item(
            second_set,
            NewSetItem {
                kind: SetItemKind::Geo,
                namespace: None,
                source_key_or_geo_key: "istanbul:besiktas".to_string(),
                destination_value: "202".to_string(),
            },
        )
        .await
        .unwrap();
    store.submit(second_set).await.unwrap();
    store.activate(second_set, "ops@example.com").await.unwrap();

    let active_id: Uuid = sqlx::query_scalar(
        "SELECT active_catalog_set_id FROM destination_catalog_set_active WHERE destination = 'evler101' AND country_code = 'TR'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(active_id, second_set);
    // Activating the second set must have demoted the first back out of
    // 'active' — only one set may hold that status per scope at a time.
    assert_eq!(active_count(&pool, "evler101", "TR").await, 1);
    let first_status: String = sqlx::query_scalar("SELECT status FROM destination_catalog_sets WHERE id = $1")
        .bind(first_set)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(first_status, "archived");

    // Roll back to the first set: the active pointer moves back, and its
    // items are upserted again (forward, not a byte-identical restore).
    store.rollback(first_set, "ops@example.com").await.unwrap();

    let active_id: Uuid = sqlx::query_scalar(
        "SELECT active_catalog_set_id FROM destination_catalog_set_active WHERE destination = 'evler101' AND country_code = 'TR'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(active_id, first_set);
    assert_eq!(active_count(&pool, "evler101", "TR").await, 1);
}

#[tokio::test]
async fn submit_requires_draft_status() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let store = CatalogSetStore::new(pool.clone());

    let set_id = store.create_draft("evler101", "").await.unwrap();
    store.submit(set_id).await.unwrap();

    // Already pending: a second submit must be rejected as a conflict.
    let err = store.submit(set_id).await.unwrap_err();
    assert!(matches!(err, hub_common::HubError::Conflict(_)));
}
