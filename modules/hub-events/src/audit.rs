//! Append-only audit trail (C12) for admin and partner-facing mutations:
//! catalog set activation, credential rotation, destination enablement.
//!
//! Grounded on the teacher's `rootsignal-events` append pattern; the shape
//! itself (actor, action, detail) follows `original_source`'s
//! `app/models/audit.py`.

use chrono::{DateTime, Utc};
use hub_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub actor: String,
    pub action: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuditLog {
    pool: PgPool,
}

impl AuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record one audit entry. Failures here are logged but never propagated
    /// to the caller — an audit-log outage must not block the mutation it
    /// describes, mirroring the teacher's treatment of non-critical writes.
    pub async fn append(
        &self,
        tenant_id: Option<Uuid>,
        actor: &str,
        action: &str,
        detail: serde_json::Value,
    ) {
        let detail = hub_common::redact(&detail);
        if let Err(err) = sqlx::query(
            r#"
            INSERT INTO audit_log (tenant_id, actor, action, detail, created_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(tenant_id)
        .bind(actor)
        .bind(action)
        .bind(&detail)
        .execute(&self.pool)
        .await
        {
            tracing::warn!(%action, %actor, error = %err, "failed to append audit log entry");
        }
    }

    pub async fn recent_for_tenant(&self, tenant_id: Uuid, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as(
            r#"
            SELECT id, tenant_id, actor, action, detail, created_at
            FROM audit_log
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
