//! Hosted-feed tick (C9 producer). Grounded on
//! `original_source/worker/feed_dispatcher.py`'s `_tick`: for every enabled
//! `hosted_feed` destination setting, load the partner's listings and hand
//! them to `FeedSnapshotStore::build_snapshot`.

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use hub_catalog::MappingStore;
use hub_common::Result;
use hub_core::ListingCanonicalV1;
use hub_delivery::{ConnectorRegistry, ListingInclusionPolicy, PartnerDestinationSettingStore};
use hub_feed::{FeedPluginRegistry, FeedSkip, FeedSnapshotStore, ObjectStore, SnapshotBuildOutcome};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ListingRow {
    payload: serde_json::Value,
    content_hash: String,
    status: String,
}

async fn fetch_partner_listings(
    pool: &PgPool,
    tenant_id: Uuid,
    partner_id: Uuid,
    policy: ListingInclusionPolicy,
) -> Result<(Vec<(ListingCanonicalV1, String)>, Vec<FeedSkip>)> {
    let rows: Vec<ListingRow> = sqlx::query_as(
        r#"
        SELECT payload, content_hash, status FROM listings
        WHERE tenant_id = $1 AND partner_id = $2
          AND schema = 'canonical.listing' AND schema_version = '1.0'
        "#,
    )
    .bind(tenant_id)
    .bind(partner_id)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    let mut skips = Vec::new();
    for row in rows {
        if policy == ListingInclusionPolicy::ExcludeInactive && row.status != "active" {
            let listing_id = serde_json::from_value::<ListingCanonicalV1>(row.payload.clone())
                .map(|l| l.canonical_id)
                .unwrap_or_default();
            skips.push(FeedSkip {
                listing_id,
                reason: format!("excluded: status={}", row.status),
            });
            continue;
        }
        match serde_json::from_value::<ListingCanonicalV1>(row.payload) {
            Ok(canonical) => out.push((canonical, row.content_hash)),
            Err(e) => {
                warn!("feed: skipping listing with unparseable canonical payload: {e}");
                skips.push(FeedSkip {
                    listing_id: String::new(),
                    reason: format!("unparseable canonical payload: {e}"),
                });
            }
        }
    }
    Ok((out, skips))
}

/// Builds (or skips, if unchanged) the hosted feed snapshot for every
/// enabled `hosted_feed` destination setting. Returns one outcome per
/// destination actually processed.
#[allow(clippy::too_many_arguments)]
pub async fn build_enabled_feeds(
    pool: &PgPool,
    settings: &PartnerDestinationSettingStore,
    snapshots: &FeedSnapshotStore,
    registry: &FeedPluginRegistry,
    mappings: &MappingStore,
    connectors: &ConnectorRegistry,
    object_store: &dyn ObjectStore,
) -> Result<Vec<(Uuid, String, SnapshotBuildOutcome)>> {
    let enabled = settings.list_enabled_with_transport("hosted_feed").await?;
    let mut results = Vec::with_capacity(enabled.len());

    for setting in enabled {
        let policy = connectors
            .get(&setting.destination)
            .map(|c| c.capabilities().listing_inclusion_policy)
            .unwrap_or(ListingInclusionPolicy::ExcludeInactive);
        let (listings, skips) =
            fetch_partner_listings(pool, setting.tenant_id, setting.partner_id, policy).await?;
        let outcome = snapshots
            .build_snapshot(
                registry,
                mappings,
                object_store,
                setting.tenant_id,
                setting.partner_id,
                &setting.destination,
                &setting.config,
                listings,
                skips,
            )
            .await?;

        match &outcome {
            SnapshotBuildOutcome::Unchanged { .. } => {
                info!(partner_id = %setting.partner_id, destination = %setting.destination, "feed: fingerprint unchanged, skipped rebuild");
            }
            SnapshotBuildOutcome::Rebuilt { snapshot } => {
                info!(partner_id = %setting.partner_id, destination = %setting.destination, listing_count = snapshot.listing_count, "feed: rebuilt snapshot");
            }
        }

        results.push((setting.partner_id, setting.destination.clone(), outcome));
    }

    Ok(results)
}
