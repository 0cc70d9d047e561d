//! Shared server state: one pool, one instance of each service the routes
//! call into. Grounded on the teacher's `rootsignal-api::AppState` shape —
//! a plain struct of already-constructed services behind `Arc`, no
//! request-scoped construction.

use sqlx::PgPool;

use hub_catalog::{CatalogSetStore, MappingStore};
use hub_core::{AdapterRegistry, IngestService};
use hub_delivery::{AgentCredentialStore, CredentialCipher, PartnerDestinationSettingStore};
use hub_events::{AuditLog, IdempotencyStore, RateLimiter};
use hub_feed::{FeedPluginRegistry, FeedSnapshotStore, LocalObjectStore};

use hub_common::Config;

use crate::auth::ApiKeyStore;

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub api_keys: ApiKeyStore,
    pub ingest: IngestService,
    pub idempotency: IdempotencyStore,
    pub audit: AuditLog,
    pub rate_limiter: Option<RateLimiter>,
    pub catalog_sets: CatalogSetStore,
    pub mappings: MappingStore,
    pub credentials: AgentCredentialStore,
    pub credential_cipher: CredentialCipher,
    pub destination_settings: PartnerDestinationSettingStore,
    pub feed_snapshots: FeedSnapshotStore,
    pub feed_plugins: FeedPluginRegistry,
    pub object_store: LocalObjectStore,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let rate_limiter = if config.redis_url.is_empty() {
            None
        } else {
            Some(RateLimiter::new(&config.redis_url)?)
        };

        Ok(Self {
            api_keys: ApiKeyStore::new(pool.clone()),
            ingest: IngestService::new(pool.clone(), AdapterRegistry::new()),
            idempotency: IdempotencyStore::new(pool.clone()),
            audit: AuditLog::new(pool.clone()),
            rate_limiter,
            catalog_sets: CatalogSetStore::new(pool.clone()),
            mappings: MappingStore::new(pool.clone()),
            credentials: AgentCredentialStore::new(pool.clone()),
            credential_cipher: CredentialCipher::new(config.credentials_encryption_key.clone()),
            destination_settings: PartnerDestinationSettingStore::new(pool.clone()),
            feed_snapshots: FeedSnapshotStore::new(pool.clone()),
            feed_plugins: FeedPluginRegistry::new(),
            object_store: LocalObjectStore::new(&config.feed_storage_dir)?,
            config,
            pool,
        })
    }
}
