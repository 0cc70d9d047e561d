//! Exercises the outbox claim/lease/complete cycle against a real Postgres,
//! the way `rootsignal-scout`'s `tests/harness` exercises its store against a
//! real backend rather than a mock.

use chrono::Duration;

use hub_events::{NewOutboxEvent, OutboxStore};

fn sample_event() -> NewOutboxEvent {
    NewOutboxEvent {
        aggregate_type: "listing".to_string(),
        aggregate_id: "lst_1".to_string(),
        event_type: "listing.upserted".to_string(),
        payload: serde_json::json!({"listing_id": "lst_1"}),
    }
}

#[tokio::test]
async fn claim_mark_done_round_trip() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let store = OutboxStore::new(pool.clone());

    let id = OutboxStore::append(&pool, sample_event()).await.unwrap();

    let claimed = store.claim_batch(10, Duration::minutes(10)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, id);
    assert_eq!(claimed[0].attempts, 1);

    // A second claim sees nothing: the row is already `processing`.
    let empty = store.claim_batch(10, Duration::minutes(10)).await.unwrap();
    assert!(empty.is_empty());

    let ok = store.mark_done(id, claimed[0].lease_id).await.unwrap();
    assert!(ok);

    let row = store.get(id).await.unwrap().unwrap();
    assert_eq!(row.status, "done");
    assert!(row.processed_at.is_some());
}

#[tokio::test]
async fn mark_done_fails_on_stale_lease() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let store = OutboxStore::new(pool.clone());

    let id = OutboxStore::append(&pool, sample_event()).await.unwrap();
    store.claim_batch(10, Duration::minutes(10)).await.unwrap();

    // A worker that lost its lease (e.g. another dispatcher reclaimed it)
    // must not be able to mark the row done.
    let stale_lease = uuid::Uuid::new_v4();
    let ok = store.mark_done(id, stale_lease).await.unwrap();
    assert!(!ok);

    let row = store.get(id).await.unwrap().unwrap();
    assert_eq!(row.status, "processing");
}

#[tokio::test]
async fn expired_lease_is_reclaimed_for_a_fresh_claim() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let store = OutboxStore::new(pool.clone());

    let id = OutboxStore::append(&pool, sample_event()).await.unwrap();

    // Claim with a lease that's already expired, simulating a crashed worker.
    let first = store.claim_batch(10, Duration::seconds(-1)).await.unwrap();
    assert_eq!(first.len(), 1);

    let reclaimed = store.claim_batch(10, Duration::minutes(10)).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, id);
    assert_ne!(reclaimed[0].lease_id, first[0].lease_id);
}

#[tokio::test]
async fn requeue_after_error_returns_event_to_pending() {
    let (_container, pool) = hub_common::testutil::postgres_container().await;
    let store = OutboxStore::new(pool.clone());

    let id = OutboxStore::append(&pool, sample_event()).await.unwrap();
    let claimed = store.claim_batch(10, Duration::minutes(10)).await.unwrap();

    store
        .requeue_after_error(id, claimed[0].lease_id, "worker panicked")
        .await
        .unwrap();

    let row = store.get(id).await.unwrap().unwrap();
    assert_eq!(row.status, "pending");
    assert_eq!(row.last_error.as_deref(), Some("worker panicked"));

    let reclaimed = store.claim_batch(10, Duration::minutes(10)).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
}
