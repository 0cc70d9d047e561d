//! Slug-keyed shared geo catalog (country → city → area), grounded on
//! `original_source/app/models/geo_{country,city,area}.py`.

use hub_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GeoCountry {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GeoCity {
    pub id: Uuid,
    pub country_id: Uuid,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GeoArea {
    pub id: Uuid,
    pub city_id: Uuid,
    pub slug: String,
    pub name: String,
}

#[derive(Clone)]
pub struct GeoStore {
    pool: PgPool,
}

impl GeoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn country_by_code(&self, code: &str) -> Result<Option<GeoCountry>> {
        let code = code.to_uppercase();
        let row = sqlx::query_as("SELECT id, code, name FROM geo_countries WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn city_by_slug(&self, country_id: Uuid, slug: &str) -> Result<Option<GeoCity>> {
        let row = sqlx::query_as(
            "SELECT id, country_id, slug, name FROM geo_cities WHERE country_id = $1 AND slug = $2",
        )
        .bind(country_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn area_by_slug(&self, city_id: Uuid, slug: &str) -> Result<Option<GeoArea>> {
        let row = sqlx::query_as(
            "SELECT id, city_id, slug, name FROM geo_areas WHERE city_id = $1 AND slug = $2",
        )
        .bind(city_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Resolve a `"city_slug:area_slug"` key within `country_id`, the
    /// compound geo key used throughout the catalog set item model.
    pub async fn resolve_geo_key(
        &self,
        country_id: Uuid,
        geo_key: &str,
    ) -> Result<Option<(GeoCity, GeoArea)>> {
        let Some((city_slug, area_slug)) = geo_key.split_once(':') else {
            return Ok(None);
        };
        let Some(city) = self.city_by_slug(country_id, city_slug).await? else {
            return Ok(None);
        };
        let Some(area) = self.area_by_slug(city.id, area_slug).await? else {
            return Ok(None);
        };
        Ok(Some((city, area)))
    }
}
