//! Idempotency reservation semantics (C11) against a real Postgres: same
//! body replays, different body conflicts, reserved-but-incomplete reports
//! in-flight.

use hub_events::{IdempotencyOutcome, IdempotencyStore};

async fn seed_tenant(pool: &sqlx::PgPool) -> uuid::Uuid {
    sqlx::query_scalar("INSERT INTO tenants (name) VALUES ('acme') RETURNING id")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn first_reservation_is_reserved_then_replays() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let tenant_id = seed_tenant(&pool).await;
    let store = IdempotencyStore::new(pool.clone());

    let body = serde_json::json!({"source_listing_id": "abc"});

    let outcome = store
        .reserve(tenant_id, "key-1", "POST", "/v1/ingest/acme/listings/abc", &body)
        .await
        .unwrap();
    assert!(matches!(outcome, IdempotencyOutcome::Reserved));

    // Before the response is stored, a retry sees the reservation as
    // in-flight rather than replaying anything.
    let outcome = store
        .reserve(tenant_id, "key-1", "POST", "/v1/ingest/acme/listings/abc", &body)
        .await
        .unwrap();
    assert!(matches!(outcome, IdempotencyOutcome::InProgress));

    store
        .store_response(tenant_id, "key-1", 200, &serde_json::json!({"listing_id": "abc"}))
        .await
        .unwrap();

    let outcome = store
        .reserve(tenant_id, "key-1", "POST", "/v1/ingest/acme/listings/abc", &body)
        .await
        .unwrap();
    match outcome {
        IdempotencyOutcome::Replay { status, body } => {
            assert_eq!(status, 200);
            assert_eq!(body["listing_id"], "abc");
        }
        _ => panic!("expected a replay"),
    }
}

#[tokio::test]
async fn same_key_different_body_is_a_conflict() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let tenant_id = seed_tenant(&pool).await;
    let store = IdempotencyStore::new(pool.clone());

    store
        .reserve(
            tenant_id,
            "key-2",
            "POST",
            "/v1/ingest/acme/listings/abc",
            &serde_json::json!({"source_listing_id": "abc"}),
        )
        .await
        .unwrap();

    let err = store
        .reserve(
            tenant_id,
            "key-2",
            "POST",
            "/v1/ingest/acme/listings/abc",
            &serde_json::json!({"source_listing_id": "different"}),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, hub_common::HubError::Conflict(_)));
}
