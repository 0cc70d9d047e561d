//! Per-destination listing dedup state (C7): the external id a connector
//! last returned and the content hash that was last pushed, so a re-publish
//! of an unchanged listing can short-circuit before projecting or calling
//! the connector. Grounded on
//! `original_source/app/models/listing_external_mapping.py` and the
//! `last_synced_hash` short-circuit `publish_delivery` performs before
//! `PublishResult`.

use sqlx::PgPool;
use uuid::Uuid;

use hub_common::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListingExternalMapping {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub partner_id: Uuid,
    pub agent_id: Uuid,
    pub listing_id: Uuid,
    pub destination: String,
    pub external_listing_id: Option<String>,
    pub last_synced_hash: String,
}

#[derive(Clone)]
pub struct ListingExternalMappingStore {
    pool: PgPool,
}

impl ListingExternalMappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        tenant_id: Uuid,
        destination: &str,
        listing_id: Uuid,
    ) -> Result<Option<ListingExternalMapping>> {
        let row = sqlx::query_as(
            r#"
            SELECT id, tenant_id, partner_id, agent_id, listing_id, destination,
                   external_listing_id, last_synced_hash
            FROM listing_external_mappings
            WHERE tenant_id = $1 AND destination = $2 AND listing_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(destination)
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        agent_id: Uuid,
        listing_id: Uuid,
        destination: &str,
        external_listing_id: Option<&str>,
        last_synced_hash: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listing_external_mappings
                (tenant_id, partner_id, agent_id, listing_id, destination,
                 external_listing_id, last_synced_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, destination, listing_id)
            DO UPDATE SET
                external_listing_id = EXCLUDED.external_listing_id,
                last_synced_hash = EXCLUDED.last_synced_hash,
                updated_at = now()
            "#,
        )
        .bind(tenant_id)
        .bind(partner_id)
        .bind(agent_id)
        .bind(listing_id)
        .bind(destination)
        .bind(external_listing_id)
        .bind(last_synced_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
