//! Partner adapter registry (C2): maps a partner's native payload onto
//! `canonical.listing@1.0`. Grounded on
//! `original_source/app/adapters/{base,registry}.py` — the
//! `(partner_key, version)` keyed map, the per-partner default version, and
//! partner-admin override authority over which version is used.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::canonical::{validate_canonical, ListingCanonicalV1, ValidationError};

#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub tenant_id: String,
    pub partner_id: String,
    pub agent_id: Option<String>,
    pub source_listing_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdapterResult {
    pub ok: bool,
    pub canonical: Option<ListingCanonicalV1>,
    pub errors: Vec<ValidationError>,
}

#[async_trait]
pub trait PartnerAdapter: Send + Sync {
    fn partner_key(&self) -> &'static str;
    fn version(&self) -> &'static str;

    /// Map `payload` onto canonical.listing@1.0. Adapters that need async
    /// lookups (e.g. resolving a partner-specific enum table) can do so; the
    /// trait is async to allow that even though the built-in adapters don't
    /// need it.
    async fn map_listing(
        &self,
        payload: &serde_json::Value,
        ctx: &AdapterContext,
    ) -> AdapterResult;
}

/// Identity adapter: the partner already sends `canonical.listing@1.0`
/// shaped payloads (minus `canonical_id`/`source_listing_id`, which the
/// ingest service fills in from the request path), so mapping is just
/// schema validation. Grounded on
/// `original_source/app/adapters/partners/passthrough.py`.
pub struct PassthroughAdapterV1;

#[async_trait]
impl PartnerAdapter for PassthroughAdapterV1 {
    fn partner_key(&self) -> &'static str {
        "passthrough"
    }

    fn version(&self) -> &'static str {
        "1.0"
    }

    async fn map_listing(
        &self,
        payload: &serde_json::Value,
        ctx: &AdapterContext,
    ) -> AdapterResult {
        let mut payload = payload.clone();
        if let Some(obj) = payload.as_object_mut() {
            obj.entry("canonical_id")
                .or_insert_with(|| serde_json::json!(ctx.partner_id.clone()));
            if let Some(source_id) = &ctx.source_listing_id {
                obj.insert("source_listing_id".to_string(), serde_json::json!(source_id));
            }
        }
        match validate_canonical(&payload) {
            Ok(canonical) => AdapterResult {
                ok: true,
                canonical: Some(canonical),
                errors: Vec::new(),
            },
            Err(errors) => AdapterResult {
                ok: false,
                canonical: None,
                errors,
            },
        }
    }
}

/// `(partner_key, version) -> adapter`, with one default version per
/// partner key. Callers resolve with `None` version to get the default; an
/// explicit version lets a partner admin pin to an older adapter while a
/// new one rolls out.
pub struct AdapterRegistry {
    adapters: HashMap<(String, String), Box<dyn PartnerAdapter>>,
    default_versions: HashMap<String, String>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            adapters: HashMap::new(),
            default_versions: HashMap::new(),
        };
        registry.register_default(Box::new(PassthroughAdapterV1));
        registry
    }

    pub fn register(&mut self, adapter: Box<dyn PartnerAdapter>, is_default: bool) {
        let key = (adapter.partner_key().to_string(), adapter.version().to_string());
        if is_default {
            self.default_versions
                .insert(adapter.partner_key().to_string(), adapter.version().to_string());
        }
        self.adapters.insert(key, adapter);
    }

    fn register_default(&mut self, adapter: Box<dyn PartnerAdapter>) {
        self.register(adapter, true);
    }

    pub fn get(&self, partner_key: &str, version: Option<&str>) -> hub_common::Result<&dyn PartnerAdapter> {
        let key = partner_key.to_lowercase();
        let ver = match version {
            Some(v) => v.to_string(),
            None => self.default_versions.get(&key).cloned().ok_or_else(|| {
                hub_common::HubError::not_found(format!(
                    "no default adapter version configured for partner_key={key}"
                ))
            })?,
        };
        self.adapters
            .get(&(key.clone(), ver.clone()))
            .map(|a| a.as_ref())
            .ok_or_else(|| hub_common::HubError::not_found(format!("unknown adapter: {key}@{ver}")))
    }

    pub fn supported(&self) -> Vec<(String, String, bool)> {
        let mut out: Vec<_> = self
            .adapters
            .keys()
            .map(|(k, v)| {
                let is_default = self.default_versions.get(k).map(|d| d == v).unwrap_or(false);
                (k.clone(), v.clone(), is_default)
            })
            .collect();
        out.sort();
        out
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
