//! The two flat lookup tables every destination projection reads from:
//! enum mappings `(destination, namespace, source_key) -> destination_value`
//! and geo mappings `(destination, geo_area_id) -> destination_area_id`.
//! These are the "runtime" tables `sets::CatalogSetStore::activate` upserts
//! into; projections never see catalog sets at all.

use hub_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DestinationEnumMapping {
    pub destination: String,
    pub namespace: String,
    pub source_key: String,
    pub destination_value: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DestinationGeoMapping {
    pub destination: String,
    pub geo_country_id: Uuid,
    pub geo_city_id: Uuid,
    pub geo_area_id: Uuid,
    pub destination_area_id: String,
}

#[derive(Clone)]
pub struct MappingStore {
    pool: PgPool,
}

impl MappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn resolve_enum(
        &self,
        destination: &str,
        namespace: &str,
        source_key: &str,
    ) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT destination_value FROM destination_enum_mappings
            WHERE destination = $1 AND namespace = $2 AND source_key = $3
            "#,
        )
        .bind(destination)
        .bind(namespace)
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    pub async fn resolve_geo_area(
        &self,
        destination: &str,
        geo_area_id: Uuid,
    ) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT destination_area_id FROM destination_geo_mappings
            WHERE destination = $1 AND geo_area_id = $2
            "#,
        )
        .bind(destination)
        .bind(geo_area_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    /// Upsert an enum mapping. Used directly by `sets::activate` within the
    /// activating transaction, and exposed here for ad-hoc admin edits
    /// outside the catalog-set lifecycle (spec.md is silent on whether those
    /// exist; original_source's API layer allows direct PUTs, so we keep the
    /// door open without building UI for it).
    pub async fn upsert_enum<'e, E>(
        executor: E,
        destination: &str,
        namespace: &str,
        source_key: &str,
        destination_value: &str,
        actor: &str,
    ) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO destination_enum_mappings
                (destination, namespace, source_key, destination_value, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (destination, namespace, source_key)
            DO UPDATE SET destination_value = EXCLUDED.destination_value, updated_by = EXCLUDED.updated_by
            "#,
        )
        .bind(destination)
        .bind(namespace)
        .bind(source_key)
        .bind(destination_value)
        .bind(actor)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn upsert_geo<'e, E>(
        executor: E,
        destination: &str,
        geo_country_id: Uuid,
        geo_city_id: Uuid,
        geo_area_id: Uuid,
        destination_area_id: &str,
        actor: &str,
    ) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO destination_geo_mappings
                (destination, geo_country_id, geo_city_id, geo_area_id, destination_area_id, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (destination, geo_area_id)
            DO UPDATE SET destination_area_id = EXCLUDED.destination_area_id, updated_by = EXCLUDED.updated_by
            "#,
        )
        .bind(destination)
        .bind(geo_country_id)
        .bind(geo_city_id)
        .bind(geo_area_id)
        .bind(destination_area_id)
        .bind(actor)
        .execute(executor)
        .await?;
        Ok(())
    }
}
