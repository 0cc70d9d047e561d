//! Transactional outbox (C4): append-only event log, lease-based claim,
//! reclaim of expired leases, conditional completion.
//!
//! Grounded on `rootsignal-events/src/store.rs`'s `EventStore` (pool held by
//! a `Clone` struct, explicit column lists in every query, `tracing::warn`
//! on best-effort side channels), generalized from its causal-fact model to
//! the lease/claim model spec.md §4.4 requires.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use hub_common::Result;

/// A fact to be appended. The caller supplies everything; the store assigns
/// `id`/`created_at`.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// An event claimed by this dispatcher tick, handed to a worker.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimedEvent {
    pub id: Uuid,
    pub lease_id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub lease_id: Option<Uuid>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OutboxStore {
    pool: PgPool,
}

fn random_lease_id() -> Uuid {
    // 128 bits of randomness, per spec.md §4.4 step 2. `Uuid::new_v4` already
    // draws from the OS RNG; we go through `rand` explicitly so the lease id
    // is visibly "a fresh 128-bit random token" rather than incidentally a
    // UUID.
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    Uuid::from_bytes(bytes)
}

impl OutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an event using any executor — a bare pool, or (the common
    /// case) the same transaction that just upserted the owning aggregate,
    /// so the write and the outbox row commit atomically.
    pub async fn append<'e, E>(executor: E, event: NewOutboxEvent) -> Result<Uuid>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO outbox_events (aggregate_type, aggregate_id, event_type, payload, status, attempts)
            VALUES ($1, $2, $3, $4, 'pending', 0)
            RETURNING id
            "#,
        )
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .fetch_one(executor)
        .await?;
        Ok(id)
    }

    /// Step 1 of the claim algorithm: requeue events whose lease expired
    /// while a worker crashed mid-flight.
    pub async fn reclaim_expired_leases(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'pending',
                lease_id = NULL,
                lease_expires_at = NULL,
                processing_started_at = NULL,
                last_error = 'requeued: lease expired'
            WHERE status = 'processing' AND lease_expires_at < now()
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Steps 1+2: reclaim expired leases, then claim up to `limit` pending
    /// events with `FOR UPDATE SKIP LOCKED`, assigning each a fresh lease.
    pub async fn claim_batch(
        &self,
        limit: i64,
        lease_duration: chrono::Duration,
    ) -> Result<Vec<ClaimedEvent>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'pending',
                lease_id = NULL,
                lease_expires_at = NULL,
                processing_started_at = NULL,
                last_error = 'requeued: lease expired'
            WHERE status = 'processing' AND lease_expires_at < now()
            "#,
        )
        .execute(&mut *tx)
        .await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM outbox_events
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let lease_expires_at = Utc::now() + lease_duration;
        let mut claimed = Vec::with_capacity(ids.len());

        // Each row gets its own fresh lease id — a shared lease across the
        // batch would let one worker's conditional update release another
        // worker's claim.
        for id in ids {
            let lease_id = random_lease_id();
            let row: ClaimedEvent = sqlx::query_as(
                r#"
                UPDATE outbox_events
                SET status = 'processing',
                    attempts = attempts + 1,
                    lease_id = $2,
                    lease_expires_at = $3,
                    processing_started_at = now()
                WHERE id = $1
                RETURNING id, lease_id, aggregate_type, aggregate_id, event_type, payload, attempts
                "#,
            )
            .bind(id)
            .bind(lease_id)
            .bind(lease_expires_at)
            .fetch_one(&mut *tx)
            .await?;
            claimed.push(row);
        }

        tx.commit().await?;
        Ok(claimed)
    }

    /// Revert a claimed-but-not-yet-enqueued event back to pending, only if
    /// the caller still holds the matching lease (step 3: enqueue failed).
    pub async fn revert_if_leased(&self, id: Uuid, lease_id: Uuid, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'pending', lease_id = NULL, lease_expires_at = NULL,
                processing_started_at = NULL, last_error = $3
            WHERE id = $1 AND lease_id = $2
            "#,
        )
        .bind(id)
        .bind(lease_id)
        .bind(format!("enqueue failed: {reason}"))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Conditionally mark an event `done`. Returns `false` if the lease no
    /// longer matches — the caller's side effects must then be treated as
    /// rolled back (spec.md §4.4: "If the conditional update changes 0 rows,
    /// the side effects are rolled back").
    pub async fn mark_done(&self, id: Uuid, lease_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'done', processed_at = now(), last_error = NULL
            WHERE id = $1 AND lease_id = $2 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(lease_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Return an event to `pending` after an unexpected worker error,
    /// clearing the lease so the next dispatcher tick can reclaim it
    /// immediately rather than waiting out the lease.
    pub async fn requeue_after_error(&self, id: Uuid, lease_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'pending', lease_id = NULL, lease_expires_at = NULL,
                processing_started_at = NULL, last_error = $3
            WHERE id = $1 AND lease_id = $2
            "#,
        )
        .bind(id)
        .bind(lease_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<OutboxEventRow>> {
        let row = sqlx::query_as(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, payload, status,
                   attempts, lease_id, lease_expires_at, processing_started_at,
                   processed_at, last_error, created_at
            FROM outbox_events WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

/// Re-exported for call sites that want to construct rows directly in
/// tests without going through JSON round-tripping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingUpsertedPayload {
    pub listing_id: Uuid,
    pub tenant_id: Uuid,
    pub partner_id: Uuid,
    pub agent_id: Uuid,
    pub content_hash: String,
}
