//! Per-destination delivery state machine (C5): pending -> success |
//! failed (retry scheduled) -> dead_lettered after `MAX_ATTEMPTS` or a
//! non-retryable connector response.
//!
//! Grounded on `original_source/worker/publish.py`'s `publish_delivery`
//! (attempt counted upfront, backoff computed from `app/services/retry.py`,
//! attempt row always written) and spec.md §4.5's lease-claimed dispatch
//! model layered on top the way `hub-events::OutboxStore` claims events.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use hub_common::Result;

use crate::connector::ConnectorResponse;

pub const MAX_DELIVERY_ATTEMPTS: i32 = 5;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Delivery {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub partner_id: Uuid,
    pub agent_id: Uuid,
    pub listing_id: Uuid,
    pub destination: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub delivery_id: Uuid,
    pub status: String,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

pub enum DispatchOutcome {
    Success,
    FailedRetryable { next_retry_at: DateTime<Utc> },
    DeadLettered { reason: String },
}

/// Exponential backoff with jitter: `min(cap, base * 2^(attempt-1)) +
/// uniform(0, min(30, exp/3))`. Grounded 1:1 on
/// `original_source/app/services/retry.py::compute_backoff_seconds`.
pub fn compute_backoff_seconds(attempt: i32) -> i64 {
    let base: i64 = 10;
    let cap: i64 = 900;
    let exp = cap.min(base * 2i64.pow((attempt - 1).max(0) as u32));
    let jitter_max = 30i64.min(exp / 3);
    let jitter = if jitter_max > 0 {
        rand::thread_rng().gen_range(0..=jitter_max)
    } else {
        0
    };
    exp + jitter
}

#[derive(Clone)]
pub struct DeliveryStore {
    pool: PgPool,
}

impl DeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_pending(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        agent_id: Uuid,
        listing_id: Uuid,
        destination: &str,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO deliveries (tenant_id, partner_id, agent_id, listing_id, destination, status, attempts)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0)
            ON CONFLICT (tenant_id, destination, listing_id)
            DO UPDATE SET status = 'pending', next_retry_at = NULL
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(partner_id)
        .bind(agent_id)
        .bind(listing_id)
        .bind(destination)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Claim deliveries that are due: `status='pending'` (first attempt) or
    /// `status='failed' AND next_retry_at <= now()`, excluding dead-lettered
    /// rows, with `FOR UPDATE SKIP LOCKED` the way the outbox claims events.
    pub async fn claim_due(&self, limit: i64) -> Result<Vec<Delivery>> {
        let rows = sqlx::query_as(
            r#"
            SELECT id, tenant_id, partner_id, agent_id, listing_id, destination, status,
                   attempts, last_error, next_retry_at, dead_lettered_at
            FROM deliveries
            WHERE dead_lettered_at IS NULL
              AND (status = 'pending' OR (status = 'failed' AND next_retry_at <= now()))
            ORDER BY COALESCE(next_retry_at, created_at) ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Apply one dispatch attempt's outcome: increment attempts, write the
    /// attempt row, and transition status/next_retry_at/dead_lettered_at.
    pub async fn record_attempt(
        &self,
        delivery: &Delivery,
        response: &ConnectorResponse,
    ) -> Result<DispatchOutcome> {
        let attempts = delivery.attempts + 1;
        let mut tx = self.pool.begin().await?;

        let outcome = if response.ok {
            sqlx::query(
                r#"
                UPDATE deliveries
                SET status = 'success', attempts = $2, last_attempt_at = now(),
                    last_success_at = now(), next_retry_at = NULL, last_error = NULL
                WHERE id = $1
                "#,
            )
            .bind(delivery.id)
            .bind(attempts)
            .execute(&mut *tx)
            .await?;
            DispatchOutcome::Success
        } else if !response.retryable || attempts >= MAX_DELIVERY_ATTEMPTS {
            let reason = response
                .error_message
                .clone()
                .unwrap_or_else(|| "max attempts exceeded".to_string());
            sqlx::query(
                r#"
                UPDATE deliveries
                SET status = 'dead_lettered', attempts = $2, last_attempt_at = now(),
                    dead_lettered_at = now(), last_error = $3
                WHERE id = $1
                "#,
            )
            .bind(delivery.id)
            .bind(attempts)
            .bind(&reason)
            .execute(&mut *tx)
            .await?;
            DispatchOutcome::DeadLettered { reason }
        } else {
            let seconds = compute_backoff_seconds(attempts);
            let next_retry_at = Utc::now() + Duration::seconds(seconds);
            sqlx::query(
                r#"
                UPDATE deliveries
                SET status = 'failed', attempts = $2, last_attempt_at = now(),
                    next_retry_at = $3, last_error = $4
                WHERE id = $1
                "#,
            )
            .bind(delivery.id)
            .bind(attempts)
            .bind(next_retry_at)
            .bind(&response.error_message)
            .execute(&mut *tx)
            .await?;
            DispatchOutcome::FailedRetryable { next_retry_at }
        };

        sqlx::query(
            r#"
            INSERT INTO delivery_attempts
                (delivery_id, status, request, response, error_code, error_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(delivery.id)
        .bind(if response.ok { "success" } else { "failed" })
        .bind(serde_json::json!({"listing_id": delivery.listing_id, "destination": delivery.destination}))
        .bind(&response.detail)
        .bind(&response.error_code)
        .bind(&response.error_message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn record_no_credentials(&self, delivery: &Delivery) -> Result<DispatchOutcome> {
        let response = ConnectorResponse {
            ok: false,
            retryable: false,
            external_id: None,
            error_code: Some("NO_CREDENTIALS".to_string()),
            error_message: Some("no active credentials for destination".to_string()),
            detail: serde_json::Value::Null,
        };
        self.record_attempt(delivery, &response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert!(compute_backoff_seconds(1) >= 10);
        assert!(compute_backoff_seconds(10) <= 900 + 30);
    }

    proptest::proptest! {
        #[test]
        fn backoff_never_exceeds_cap_plus_jitter(attempt in 1i32..50) {
            let seconds = compute_backoff_seconds(attempt);
            proptest::prop_assert!(seconds <= 900 + 30);
            proptest::prop_assert!(seconds >= 10);
        }
    }
}
