//! Per-delivery state machine (C5) against a real Postgres: claim-due
//! picks up pending rows, a retryable failure schedules a retry, a
//! non-retryable failure dead-letters immediately, and `MAX_DELIVERY_ATTEMPTS`
//! retryable failures eventually dead-letter too.

use hub_delivery::connector::ConnectorResponse;
use hub_delivery::delivery::{DeliveryStore, MAX_DELIVERY_ATTEMPTS};
use sqlx::PgPool;
use uuid::Uuid;

struct Scope {
    tenant_id: Uuid,
    partner_id: Uuid,
    agent_id: Uuid,
    listing_id: Uuid,
}

async fn seed_scope(pool: &PgPool) -> Scope {
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
    let agent_id: Uuid = sqlx::query_scalar(
        "INSERT INTO agents (tenant_id, partner_id, name) VALUES ($1, $2, 'Agent') RETURNING id",
    )
    .bind(tenant_id)
    .bind(partner_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let listing_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO listings
            (id, tenant_id, partner_id, agent_id, schema, schema_version, payload, content_hash, status, created_by, updated_by)
        VALUES ($1, $2, $3, $4, 'canonical.listing', '1.0', '{}'::jsonb, 'h1', 'active', 'test', 'test')
        "#,
    )
    .bind(listing_id)
    .bind(tenant_id)
    .bind(partner_id)
    .bind(agent_id)
    .execute(pool)
    .await
    .unwrap();
    Scope {
        tenant_id,
        partner_id,
        agent_id,
        listing_id,
    }
}

fn ok_response() -> ConnectorResponse {
    ConnectorResponse {
        ok: true,
        retryable: false,
        external_id: Some("ext-1".to_string()),
        error_code: None,
        error_message: None,
        detail: serde_json::json!({}),
    }
}

fn retryable_failure() -> ConnectorResponse {
    ConnectorResponse {
        ok: false,
        retryable: true,
        external_id: None,
        error_code: Some("UPSTREAM_ERROR".to_string()),
        error_message: Some("502".to_string()),
        detail: serde_json::Value::Null,
    }
}

fn terminal_failure() -> ConnectorResponse {
    ConnectorResponse {
        ok: false,
        retryable: false,
        external_id: None,
        error_code: Some("UNAUTHORIZED".to_string()),
        error_message: Some("401".to_string()),
        detail: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn claim_due_picks_up_pending_row_and_success_clears_it() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let scope = seed_scope(&pool).await;
    let store = DeliveryStore::new(pool.clone());

    store
        .upsert_pending(scope.tenant_id, scope.partner_id, scope.agent_id, scope.listing_id, "mock")
        .await
        .unwrap();

    let due = store.claim_due(10).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].status, "pending");

    let delivery_id = due[0].id;
    store.record_attempt(&due[0], &ok_response()).await.unwrap();

    let due = store.claim_due(10).await.unwrap();
    assert!(due.is_empty());

    let attempts: i64 = sqlx::query_scalar("SELECT count(*) FROM delivery_attempts WHERE delivery_id = $1")
        .bind(delivery_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(attempts, 1);

    let status: String = sqlx::query_scalar("SELECT status FROM deliveries WHERE id = $1")
        .bind(delivery_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "success");
}

#[tokio::test]
async fn retryable_failure_schedules_retry_then_eventually_dead_letters() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let scope = seed_scope(&pool).await;
    let store = DeliveryStore::new(pool.clone());

    store
        .upsert_pending(scope.tenant_id, scope.partner_id, scope.agent_id, scope.listing_id, "mock")
        .await
        .unwrap();

    // Drive the retry loop directly through DeliveryStore rather than via
    // claim_due (next_retry_at is in the future between attempts).
    let mut delivery_id: Uuid = sqlx::query_scalar("SELECT id FROM deliveries WHERE listing_id = $1")
        .bind(scope.listing_id)
        .fetch_one(&pool)
        .await
        .unwrap();

    for _ in 1..MAX_DELIVERY_ATTEMPTS {
        let delivery = {
            let row: hub_delivery::delivery::Delivery = sqlx::query_as(
                r#"
                SELECT id, tenant_id, partner_id, agent_id, listing_id, destination, status,
                       attempts, last_error, next_retry_at, dead_lettered_at
                FROM deliveries WHERE id = $1
                "#,
            )
            .bind(delivery_id)
            .fetch_one(&pool)
            .await
            .unwrap();
            row
        };
        let outcome = store.record_attempt(&delivery, &retryable_failure()).await.unwrap();
        assert!(matches!(outcome, hub_delivery::delivery::DispatchOutcome::FailedRetryable { .. }));
        delivery_id = delivery.id;
    }

    let delivery: hub_delivery::delivery::Delivery = sqlx::query_as(
        r#"
        SELECT id, tenant_id, partner_id, agent_id, listing_id, destination, status,
               attempts, last_error, next_retry_at, dead_lettered_at
        FROM deliveries WHERE id = $1
        "#,
    )
    .bind(delivery_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(delivery.attempts, MAX_DELIVERY_ATTEMPTS - 1);
    assert_eq!(delivery.status, "failed");

    // One more retryable failure crosses MAX_DELIVERY_ATTEMPTS: dead-lettered.
    let outcome = store.record_attempt(&delivery, &retryable_failure()).await.unwrap();
    assert!(matches!(outcome, hub_delivery::delivery::DispatchOutcome::DeadLettered { .. }));

    let dead_lettered: bool = sqlx::query_scalar("SELECT dead_lettered_at IS NOT NULL FROM deliveries WHERE id = $1")
        .bind(delivery_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(dead_lettered);
}

#[tokio::test]
async fn non_retryable_failure_dead_letters_on_first_attempt() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let scope = seed_scope(&pool).await;
    let store = DeliveryStore::new(pool.clone());

    store
        .upsert_pending(scope.tenant_id, scope.partner_id, scope.agent_id, scope.listing_id, "mock")
        .await
        .unwrap();
    let due = store.claim_due(10).await.unwrap();

    let outcome = store.record_attempt(&due[0], &terminal_failure()).await.unwrap();
    assert!(matches!(outcome, hub_delivery::delivery::DispatchOutcome::DeadLettered { .. }));

    let due = store.claim_due(10).await.unwrap();
    assert!(due.is_empty(), "dead-lettered deliveries are never re-claimed");
}
