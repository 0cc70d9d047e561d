//! Ingest orchestration (C3): adapter mapping, listing upsert keyed by
//! `(tenant, partner, partner_key, source_listing_id)`, and the
//! outbox-append of a `listing.upserted` event when the content hash
//! changes. Grounded on `original_source/app/services/ingest.py`.

use hub_common::{content_hash as compute_content_hash, redact, HubError, Result};
use hub_events::{NewOutboxEvent, OutboxStore};
use sqlx::PgPool;
use uuid::Uuid;

use crate::adapter::{AdapterContext, AdapterRegistry};
use crate::canonical::{validate_canonical, ValidationError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Listing {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub partner_id: Uuid,
    pub agent_id: Uuid,
    pub payload: serde_json::Value,
    pub content_hash: String,
    pub status: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SourceListingMappingRow {
    listing_id: Uuid,
    adapter_version: String,
}

pub struct IngestOutcome {
    pub listing: Option<Listing>,
    pub material_change: bool,
    pub ingest_run_id: Uuid,
    pub used_adapter_version: String,
}

pub struct IngestService {
    pool: PgPool,
    registry: AdapterRegistry,
}

impl IngestService {
    pub fn new(pool: PgPool, registry: AdapterRegistry) -> Self {
        Self { pool, registry }
    }

    /// Idempotent on `(tenant_id, partner_id, partner_key, source_listing_id,
    /// idempotency_key)`: a retry of the exact same ingest call returns the
    /// previously recorded outcome instead of re-running the adapter and
    /// re-appending an outbox event.
    #[allow(clippy::too_many_arguments)]
    pub async fn ingest_listing(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        agent_id: Uuid,
        partner_key: &str,
        source_listing_id: &str,
        idempotency_key: &str,
        partner_payload: serde_json::Value,
        adapter_version: Option<&str>,
        allow_adapter_override: bool,
    ) -> Result<IngestOutcome> {
        let partner_key = partner_key.to_lowercase();

        let default_adapter = self.registry.get(&partner_key, None)?;
        let used_version = adapter_version
            .unwrap_or(default_adapter.version())
            .to_string();

        // Insert the run row before doing any adapter/validation work. A
        // concurrent duplicate request racing us on the same
        // (tenant, partner, partner_key, source_listing_id, idempotency_key)
        // tuple hits the unique constraint here rather than after both
        // requests have done the expensive mapping work, and the loser
        // replays the winner's outcome instead of erroring.
        let run_id = match self
            .try_insert_run(
                tenant_id,
                partner_id,
                agent_id,
                &partner_key,
                source_listing_id,
                idempotency_key,
                &partner_payload,
                &used_version,
            )
            .await?
        {
            RunInsert::Inserted(id) => id,
            RunInsert::Conflict => {
                let existing = self
                    .find_existing_run(
                        tenant_id,
                        partner_id,
                        &partner_key,
                        source_listing_id,
                        idempotency_key,
                    )
                    .await?
                    .expect("unique violation implies a conflicting row exists");
                return self.replay_outcome(existing).await;
            }
        };

        if adapter_version.is_some() && !allow_adapter_override {
            self.fail_run(
                run_id,
                None,
                &serde_json::json!([{"type": "forbidden", "message": "adapter_version override not allowed"}]),
            )
            .await?;
            return Err(HubError::forbidden(format!(
                "adapter_version override not allowed (ingest_run_id={run_id})"
            )));
        }

        let adapter = self.registry.get(&partner_key, adapter_version)?;
        let ctx = AdapterContext {
            tenant_id: tenant_id.to_string(),
            partner_id: partner_id.to_string(),
            agent_id: Some(agent_id.to_string()),
            source_listing_id: Some(source_listing_id.to_string()),
        };
        let mapped = adapter.map_listing(&partner_payload, &ctx).await;

        if !mapped.ok {
            self.fail_run(run_id, None, &errors_to_json(&mapped.errors)).await?;
            return Err(HubError::validation(format!(
                "adapter mapping failed (ingest_run_id={run_id})"
            )));
        }

        let mapping = self
            .find_mapping(tenant_id, partner_id, &partner_key, source_listing_id)
            .await?;
        let listing_id = mapping.as_ref().map(|m| m.listing_id).unwrap_or_else(Uuid::new_v4);

        let mut canonical_value = serde_json::to_value(mapped.canonical.unwrap())
            .map_err(|e| HubError::validation(e.to_string()))?;
        if let Some(obj) = canonical_value.as_object_mut() {
            obj.insert("canonical_id".into(), serde_json::json!(listing_id));
            obj.insert(
                "source_listing_id".into(),
                serde_json::json!(source_listing_id),
            );
        }

        let normalized = match validate_canonical(&canonical_value) {
            Ok(listing) => serde_json::to_value(listing).expect("re-serializing always succeeds"),
            Err(errors) => {
                self.fail_run(run_id, Some(&canonical_value), &errors_to_json(&errors))
                    .await?;
                return Err(HubError::validation(format!(
                    "canonical validation failed (ingest_run_id={run_id})"
                )));
            }
        };

        let new_content_hash = compute_content_hash(&normalized);

        let mut tx = self.pool.begin().await?;

        let existing_listing: Option<Listing> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, partner_id, agent_id, payload, content_hash, status
            FROM listings WHERE id = $1 AND tenant_id = $2 AND partner_id = $3 AND agent_id = $4
            "#,
        )
        .bind(listing_id)
        .bind(tenant_id)
        .bind(partner_id)
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await?;

        let status = normalized
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("draft")
            .to_string();

        let material_change = match &existing_listing {
            None => true,
            Some(l) => l.content_hash != new_content_hash,
        };

        let listing: Listing = if existing_listing.is_none() {
            sqlx::query_as(
                r#"
                INSERT INTO listings
                    (id, tenant_id, partner_id, agent_id, schema, schema_version, payload,
                     content_hash, status, created_by, updated_by)
                VALUES ($1, $2, $3, $4, 'canonical.listing', '1.0', $5, $6, $7, 'ingest', 'ingest')
                RETURNING id, tenant_id, partner_id, agent_id, payload, content_hash, status
                "#,
            )
            .bind(listing_id)
            .bind(tenant_id)
            .bind(partner_id)
            .bind(agent_id)
            .bind(&normalized)
            .bind(&new_content_hash)
            .bind(&status)
            .fetch_one(&mut *tx)
            .await?
        } else if material_change {
            sqlx::query_as(
                r#"
                UPDATE listings
                SET payload = $2, content_hash = $3, status = $4, updated_by = 'ingest', updated_at = now()
                WHERE id = $1
                RETURNING id, tenant_id, partner_id, agent_id, payload, content_hash, status
                "#,
            )
            .bind(listing_id)
            .bind(&normalized)
            .bind(&new_content_hash)
            .bind(&status)
            .fetch_one(&mut *tx)
            .await?
        } else {
            existing_listing.unwrap()
        };

        if mapping.is_none() {
            sqlx::query(
                r#"
                INSERT INTO source_listing_mappings
                    (tenant_id, partner_id, agent_id, partner_key, adapter_version, source_listing_id, listing_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(tenant_id)
            .bind(partner_id)
            .bind(agent_id)
            .bind(&partner_key)
            .bind(&used_version)
            .bind(source_listing_id)
            .bind(listing_id)
            .execute(&mut *tx)
            .await?;
        } else if mapping.as_ref().unwrap().adapter_version != used_version {
            sqlx::query(
                r#"
                UPDATE source_listing_mappings SET adapter_version = $4
                WHERE tenant_id = $1 AND partner_id = $2 AND partner_key = $3 AND source_listing_id = $5
                "#,
            )
            .bind(tenant_id)
            .bind(partner_id)
            .bind(&partner_key)
            .bind(&used_version)
            .bind(source_listing_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE ingest_runs
            SET status = 'success', errors = '[]'::jsonb, canonical_payload = $2, listing_id = $3
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(&normalized)
        .bind(listing_id)
        .execute(&mut *tx)
        .await?;

        if material_change {
            OutboxStore::append(
                &mut *tx,
                NewOutboxEvent {
                    aggregate_type: "listing".to_string(),
                    aggregate_id: listing_id.to_string(),
                    event_type: "listing.upserted".to_string(),
                    payload: serde_json::json!({
                        "listing_id": listing_id,
                        "tenant_id": tenant_id,
                        "partner_id": partner_id,
                        "agent_id": agent_id,
                        "content_hash": new_content_hash,
                    }),
                },
            )
            .await?;
        }

        tx.commit().await?;

        Ok(IngestOutcome {
            listing: Some(listing),
            material_change,
            ingest_run_id: run_id,
            used_adapter_version: used_version,
        })
    }

    async fn find_mapping(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        partner_key: &str,
        source_listing_id: &str,
    ) -> Result<Option<SourceListingMappingRow>> {
        let row = sqlx::query_as(
            r#"
            SELECT listing_id, adapter_version FROM source_listing_mappings
            WHERE tenant_id = $1 AND partner_id = $2 AND partner_key = $3 AND source_listing_id = $4
            "#,
        )
        .bind(tenant_id)
        .bind(partner_id)
        .bind(partner_key)
        .bind(source_listing_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_existing_run(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        partner_key: &str,
        source_listing_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Uuid>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM ingest_runs
            WHERE tenant_id = $1 AND partner_id = $2 AND partner_key = $3
              AND source_listing_id = $4 AND idempotency_key = $5
            "#,
        )
        .bind(tenant_id)
        .bind(partner_id)
        .bind(partner_key)
        .bind(source_listing_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn replay_outcome(&self, ingest_run_id: Uuid) -> Result<IngestOutcome> {
        let row: (String, Option<Uuid>, String) = sqlx::query_as(
            "SELECT status, listing_id, adapter_version FROM ingest_runs WHERE id = $1",
        )
        .bind(ingest_run_id)
        .fetch_one(&self.pool)
        .await?;

        let (status, listing_id, adapter_version) = row;
        let listing = if status == "success" {
            match listing_id {
                Some(id) => sqlx::query_as(
                    "SELECT id, tenant_id, partner_id, agent_id, payload, content_hash, status FROM listings WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
                None => None,
            }
        } else {
            None
        };

        Ok(IngestOutcome {
            listing,
            material_change: false,
            ingest_run_id,
            used_adapter_version: adapter_version,
        })
    }

    /// Insert the `ingest_runs` placeholder row that the rest of
    /// `ingest_listing` mutates in place. Mirrors
    /// `original_source/app/services/ingest.py`'s `db.add(run)` /
    /// `db.flush()` pair: the row lands in the table before any adapter or
    /// validation work happens, so a concurrent duplicate hits the unique
    /// constraint here instead of after both requests have done that work.
    #[allow(clippy::too_many_arguments)]
    async fn try_insert_run(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        agent_id: Uuid,
        partner_key: &str,
        source_listing_id: &str,
        idempotency_key: &str,
        raw_payload: &serde_json::Value,
        adapter_version: &str,
    ) -> Result<RunInsert> {
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO ingest_runs
                (tenant_id, partner_id, agent_id, partner_key, source_listing_id, idempotency_key,
                 raw_payload, canonical_payload, errors, status, listing_id, adapter_version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, '[]'::jsonb, 'failed', NULL, $8)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(partner_id)
        .bind(agent_id)
        .bind(partner_key)
        .bind(source_listing_id)
        .bind(idempotency_key)
        .bind(redact(raw_payload))
        .bind(adapter_version)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(id) => Ok(RunInsert::Inserted(id)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(RunInsert::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark the placeholder run as failed in place — used by every early-exit
    /// path after the placeholder insert has already claimed the idempotency
    /// key.
    async fn fail_run(
        &self,
        run_id: Uuid,
        canonical_payload: Option<&serde_json::Value>,
        errors: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_runs SET status = 'failed', canonical_payload = $2, errors = $3
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(canonical_payload)
        .bind(errors)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

enum RunInsert {
    Inserted(Uuid),
    Conflict,
}

fn errors_to_json(errors: &[ValidationError]) -> serde_json::Value {
    serde_json::to_value(errors).expect("ValidationError always serializes")
}
