//! Ingest orchestration (C3) end to end against a real Postgres: idempotent
//! replay, material-change detection, and the outbox append that follows a
//! successful ingest.

use hub_core::adapter::AdapterRegistry;
use hub_core::ingest::IngestService;
use sqlx::PgPool;
use uuid::Uuid;

struct Scope {
    tenant_id: Uuid,
    partner_id: Uuid,
    agent_id: Uuid,
}

async fn seed_scope(pool: &PgPool) -> Scope {
    let tenant_id: Uuid = sqlx::query_scalar("INSERT INTO tenants (name) VALUES ('acme') RETURNING id")
        .fetch_one(pool)
        .await
        .unwrap();
    let partner_id: Uuid = sqlx::query_scalar(
        "INSERT INTO partners (tenant_id, partner_key, name) VALUES ($1, 'passthrough', 'Acme Partner') RETURNING id",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let agent_id: Uuid = sqlx::query_scalar(
        "INSERT INTO agents (tenant_id, partner_id, name) VALUES ($1, $2, 'Acme Agent') RETURNING id",
    )
    .bind(tenant_id)
    .bind(partner_id)
    .fetch_one(pool)
    .await
    .unwrap();
    Scope {
        tenant_id,
        partner_id,
        agent_id,
    }
}

fn payload(title: &str) -> serde_json::Value {
    serde_json::json!({
        "purpose": "sale",
        "title": title,
        "list_price": {"currency": "GBP", "amount": 250000},
    })
}

#[tokio::test]
async fn ingest_is_idempotent_and_detects_material_change() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let scope = seed_scope(&pool).await;
    let service = IngestService::new(pool.clone(), AdapterRegistry::new());

    let first = service
        .ingest_listing(
            scope.tenant_id,
            scope.partner_id,
            scope.agent_id,
            "passthrough",
            "src-1",
            "idem-1",
            payload("Nice flat"),
            None,
            false,
        )
        .await
        .unwrap();
    assert!(first.material_change);
    let listing_id = first.listing.unwrap().id;

    // Same idempotency key, same call: replay, not a second ingest run.
    let replay = service
        .ingest_listing(
            scope.tenant_id,
            scope.partner_id,
            scope.agent_id,
            "passthrough",
            "src-1",
            "idem-1",
            payload("Nice flat"),
            None,
            false,
        )
        .await
        .unwrap();
    assert_eq!(replay.ingest_run_id, first.ingest_run_id);
    assert!(!replay.material_change);

    // New idempotency key, unchanged payload: same listing, no material change.
    let unchanged = service
        .ingest_listing(
            scope.tenant_id,
            scope.partner_id,
            scope.agent_id,
            "passthrough",
            "src-1",
            "idem-2",
            payload("Nice flat"),
            None,
            false,
        )
        .await
        .unwrap();
    assert_eq!(unchanged.listing.unwrap().id, listing_id);
    assert!(!unchanged.material_change);

    // New idempotency key, changed payload: same listing row, material change.
    let changed = service
        .ingest_listing(
            scope.tenant_id,
            scope.partner_id,
            scope.agent_id,
            "passthrough",
            "src-1",
            "idem-3",
            payload("Nicer flat"),
            None,
            false,
        )
        .await
        .unwrap();
    assert_eq!(changed.listing.as_ref().unwrap().id, listing_id);
    assert!(changed.material_change);

    let outbox_count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM outbox_events WHERE aggregate_id = $1 AND event_type = 'listing.upserted'",
    )
    .bind(listing_id.to_string())
    .fetch_one(&pool)
    .await
    .unwrap();
    // One event for the initial ingest, one for the changed-payload ingest;
    // the two no-op calls in between append nothing.
    assert_eq!(outbox_count, 2);
}

#[tokio::test]
async fn non_default_adapter_version_without_override_is_forbidden() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let scope = seed_scope(&pool).await;
    let service = IngestService::new(pool.clone(), AdapterRegistry::new());

    let err = service
        .ingest_listing(
            scope.tenant_id,
            scope.partner_id,
            scope.agent_id,
            "passthrough",
            "src-2",
            "idem-1",
            payload("Nice flat"),
            Some("2.0"),
            false,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, hub_common::HubError::Authorization(_)));
}
