//! Idempotency store (C11): first caller to present an `Idempotency-Key`
//! for a given tenant+path reserves it; a retry with the same request body
//! replays the stored response, a retry with a different body is a conflict.
//!
//! Grounded on `original_source/app/services/idempotency.py`.

use chrono::{DateTime, Utc};
use hub_common::{content_hash, HubError, Result};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
struct IdempotencyRow {
    request_hash: String,
    response_status: Option<i32>,
    response_body: Option<serde_json::Value>,
}

pub enum IdempotencyOutcome {
    /// No prior record — the caller reserved the key and should proceed.
    Reserved,
    /// A finished response was already recorded for this exact request.
    Replay {
        status: u16,
        body: serde_json::Value,
    },
    /// Another request is still in flight (reserved, not yet completed).
    InProgress,
}

#[derive(Clone)]
pub struct IdempotencyStore {
    pool: PgPool,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reserve `key` for `tenant_id`, hashing `(method, path, body)` into a
    /// request fingerprint. If a row already exists with a different
    /// fingerprint, that's a genuine key reuse across distinct requests —
    /// an `HubError::Conflict`.
    pub async fn reserve(
        &self,
        tenant_id: Uuid,
        key: &str,
        method: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<IdempotencyOutcome> {
        let request_hash = content_hash(&serde_json::json!({
            "method": method,
            "path": path,
            "body": body,
        }));

        let existing: Option<IdempotencyRow> = sqlx::query_as(
            r#"
            SELECT request_hash, response_status, response_body
            FROM idempotency_keys
            WHERE tenant_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(tenant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            if row.request_hash != request_hash {
                return Err(HubError::conflict(
                    "idempotency key reused with a different request body",
                ));
            }
            return Ok(match (row.response_status, row.response_body) {
                (Some(status), Some(body)) => IdempotencyOutcome::Replay {
                    status: status as u16,
                    body,
                },
                _ => IdempotencyOutcome::InProgress,
            });
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (tenant_id, idempotency_key, request_hash, created_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (tenant_id, idempotency_key) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(key)
        .bind(&request_hash)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            // Lost a race with a concurrent reservation of the same key;
            // recurse once to read what the winner stored.
            return Box::pin(self.reserve(tenant_id, key, method, path, body)).await;
        }

        Ok(IdempotencyOutcome::Reserved)
    }

    pub async fn store_response(
        &self,
        tenant_id: Uuid,
        key: &str,
        status: u16,
        body: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET response_status = $3, response_body = $4, completed_at = now()
            WHERE tenant_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(tenant_id)
        .bind(key)
        .bind(status as i32)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop reservations older than `ttl` that never completed, so a crashed
    /// request doesn't permanently wedge a key.
    pub async fn purge_stale_reservations(&self, ttl: chrono::Duration) -> Result<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - ttl;
        let result = sqlx::query(
            "DELETE FROM idempotency_keys WHERE completed_at IS NULL AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
