//! Projection plugins (C7): canonical.listing@1.0 -> destination payload,
//! consuming the catalog substrate's enum/geo resolvers with a
//! config-fallback when the catalog has no mapping yet.
//!
//! Grounded on `original_source/app/services/destination_mapping.py`
//! (`resolve_enum_with_fallback`: db mapping wins, falls back to a
//! connector-local static config) and the `required_mapping_keys` /
//! `check_mappings` pair spec.md §4.7 describes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use uuid::Uuid;

use hub_catalog::MappingStore;
use hub_common::Result;
use hub_core::ListingCanonicalV1;

#[derive(Debug, Clone, Default)]
pub struct RequiredMappingKeys {
    pub enum_keys: BTreeMap<String, BTreeSet<String>>,
    pub geo_keys: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct MappingCheck {
    pub ok: bool,
    pub missing: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct ProjectionContext<'a> {
    pub tenant_id: Uuid,
    pub partner_id: Uuid,
    pub agent_id: Uuid,
    pub destination: &'a str,
    pub external_agent_id: Option<String>,
    pub external_listing_id: Option<String>,
}

#[async_trait]
pub trait Projection: Send + Sync {
    fn destination(&self) -> &'static str;

    /// Canonical fields this projection will need mapped, computed purely
    /// from the listing with no DB access — lets the caller batch-resolve
    /// via `MappingStore` before projecting.
    fn required_mapping_keys(&self, listing: &ListingCanonicalV1) -> RequiredMappingKeys;

    async fn check_mappings(
        &self,
        mappings: &MappingStore,
        destination: &str,
        keys: &RequiredMappingKeys,
    ) -> Result<MappingCheck> {
        let mut missing = Vec::new();
        for (namespace, source_keys) in &keys.enum_keys {
            for key in source_keys {
                if mappings
                    .resolve_enum(destination, namespace, key)
                    .await?
                    .is_none()
                {
                    missing.push(format!("enum:{namespace}:{key}"));
                }
            }
        }
        Ok(MappingCheck {
            ok: missing.is_empty(),
            missing,
            warnings: Vec::new(),
        })
    }

    async fn project(
        &self,
        listing: &ListingCanonicalV1,
        ctx: &ProjectionContext<'_>,
        mappings: &MappingStore,
    ) -> Result<serde_json::Value>;
}

/// Projects the canonical listing unchanged (plus context identifiers), for
/// destinations that accept the hub's own shape.
pub struct PassthroughProjection;

#[async_trait]
impl Projection for PassthroughProjection {
    fn destination(&self) -> &'static str {
        "passthrough"
    }

    fn required_mapping_keys(&self, _listing: &ListingCanonicalV1) -> RequiredMappingKeys {
        RequiredMappingKeys::default()
    }

    async fn project(
        &self,
        listing: &ListingCanonicalV1,
        ctx: &ProjectionContext<'_>,
        _mappings: &MappingStore,
    ) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(listing).expect("canonical listing always serializes");
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "external_listing_id".to_string(),
                serde_json::json!(ctx.external_listing_id),
            );
            obj.insert(
                "external_agent_id".to_string(),
                serde_json::json!(ctx.external_agent_id),
            );
        }
        Ok(value)
    }
}

/// Maps `property.category` through the catalog's enum table under
/// namespace `"property_category"`, falling back to a small static table
/// when the catalog has no override — the `resolve_enum_with_fallback`
/// two-tier lookup, generalized to one concrete field as the worked example
/// the hub's other projections follow.
pub struct CategoryMappedProjection {
    destination: &'static str,
    fallback: HashMap<&'static str, &'static str>,
}

impl CategoryMappedProjection {
    pub fn new(destination: &'static str, fallback: HashMap<&'static str, &'static str>) -> Self {
        Self {
            destination,
            fallback,
        }
    }
}

#[async_trait]
impl Projection for CategoryMappedProjection {
    fn destination(&self) -> &'static str {
        self.destination
    }

    fn required_mapping_keys(&self, listing: &ListingCanonicalV1) -> RequiredMappingKeys {
        let mut enum_keys = BTreeMap::new();
        let category = serde_json::to_value(listing.property.category)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "other".to_string());
        enum_keys.insert("property_category".to_string(), BTreeSet::from([category]));
        RequiredMappingKeys {
            enum_keys,
            geo_keys: BTreeSet::new(),
        }
    }

    async fn project(
        &self,
        listing: &ListingCanonicalV1,
        ctx: &ProjectionContext<'_>,
        mappings: &MappingStore,
    ) -> Result<serde_json::Value> {
        let category = serde_json::to_value(listing.property.category)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "other".to_string());

        let mapped_category = match mappings
            .resolve_enum(self.destination, "property_category", &category)
            .await?
        {
            Some(value) => value,
            None => self
                .fallback
                .get(category.as_str())
                .map(|s| s.to_string())
                .unwrap_or(category.clone()),
        };

        Ok(serde_json::json!({
            "canonical_id": listing.canonical_id,
            "title": listing.title,
            "category": mapped_category,
            "external_listing_id": ctx.external_listing_id,
        }))
    }
}

pub struct ProjectionRegistry {
    projections: HashMap<String, Box<dyn Projection>>,
}

impl ProjectionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            projections: HashMap::new(),
        };
        registry.register(Box::new(PassthroughProjection));
        registry
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections
            .insert(projection.destination().to_string(), projection);
    }

    pub fn get(&self, destination: &str) -> Result<&dyn Projection> {
        self.projections
            .get(&destination.to_lowercase())
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                hub_common::HubError::not_found(format!(
                    "no projection registered for destination={destination}"
                ))
            })
    }
}

impl Default for ProjectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
