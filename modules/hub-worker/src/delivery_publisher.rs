//! Single-delivery dispatch (C6 -> C7 boundary). Grounded on
//! `original_source/worker/publish.py::publish_delivery`: load the listing
//! and its destination credentials, project the canonical listing through
//! the destination's mapper, call the connector, then record the outcome
//! through the same state machine the original's retry bookkeeping drives.

use sqlx::PgPool;
use tracing::{info, warn};

use hub_catalog::MappingStore;
use hub_common::Result;
use hub_core::ListingCanonicalV1;
use hub_delivery::{
    AgentCredentialStore, ConnectorRegistry, ConnectorResponse, CredentialCipher, Delivery,
    DeliveryStore, DispatchOutcome, ListingExternalMappingStore, ProjectionRegistry, Transport,
};
use hub_delivery::projection::ProjectionContext;

#[derive(Debug, Clone, sqlx::FromRow)]
struct ListingPayloadRow {
    payload: serde_json::Value,
    content_hash: String,
}

async fn fetch_canonical(
    pool: &PgPool,
    listing_id: uuid::Uuid,
) -> Result<Option<(ListingCanonicalV1, String)>> {
    let row: Option<ListingPayloadRow> =
        sqlx::query_as("SELECT payload, content_hash FROM listings WHERE id = $1")
            .bind(listing_id)
            .fetch_optional(pool)
            .await?;
    let Some(row) = row else { return Ok(None) };
    let canonical = serde_json::from_value(row.payload)
        .map_err(|e| hub_common::HubError::validation(format!("stored listing payload doesn't match canonical schema: {e}")))?;
    Ok(Some((canonical, row.content_hash)))
}

/// Dispatches one claimed delivery to its destination connector and records
/// the outcome. Returns `Ok(None)` when the listing backing the delivery has
/// since been deleted, in which case the caller should leave the delivery
/// alone rather than retry it forever.
#[allow(clippy::too_many_arguments)]
pub async fn publish_delivery(
    pool: &PgPool,
    deliveries: &DeliveryStore,
    credentials: &AgentCredentialStore,
    cipher: &CredentialCipher,
    connectors: &ConnectorRegistry,
    projections: &ProjectionRegistry,
    mappings: &MappingStore,
    external_mappings: &ListingExternalMappingStore,
    delivery: &Delivery,
) -> Result<Option<DispatchOutcome>> {
    let Some((listing, content_hash)) = fetch_canonical(pool, delivery.listing_id).await? else {
        warn!(delivery_id = %delivery.id, listing_id = %delivery.listing_id, "delivery: listing no longer exists, skipping");
        return Ok(None);
    };

    let connector = connectors.get(&delivery.destination)?;
    let capabilities = connector.capabilities();

    // Hosted-feed and pull-only destinations are driven entirely by the
    // feed snapshot / partner pull path; per-listing dispatch never reaches
    // the connector for them.
    if matches!(capabilities.transport, Transport::HostedFeed | Transport::PullOnly) {
        info!(delivery_id = %delivery.id, destination = %delivery.destination, "delivery: hosted-feed/pull-only transport, no-op");
        let outcome = deliveries
            .record_attempt(delivery, &ConnectorResponse::hosted_feed_noop())
            .await?;
        return Ok(Some(outcome));
    }

    let existing_mapping = external_mappings
        .find(delivery.tenant_id, &delivery.destination, delivery.listing_id)
        .await?;
    if let Some(mapping) = &existing_mapping {
        if mapping.last_synced_hash == content_hash {
            info!(delivery_id = %delivery.id, destination = %delivery.destination, "delivery: content hash unchanged since last sync, no-op");
            let outcome = deliveries
                .record_attempt(
                    delivery,
                    &ConnectorResponse::unchanged_noop(mapping.external_listing_id.clone()),
                )
                .await?;
            return Ok(Some(outcome));
        }
    }

    let credential_row = credentials
        .find_active(
            delivery.tenant_id,
            delivery.partner_id,
            delivery.agent_id,
            &delivery.destination,
        )
        .await?;

    let Some(credential_row) = credential_row else {
        info!(delivery_id = %delivery.id, destination = %delivery.destination, "delivery: no active credentials, dead-lettering");
        return Ok(Some(deliveries.record_no_credentials(delivery).await?));
    };

    let secret = credentials.decrypt(cipher, &credential_row)?;

    let projection = projections.get(&delivery.destination)?;

    let required_keys = projection.required_mapping_keys(&listing);
    let check = projection
        .check_mappings(mappings, &delivery.destination, &required_keys)
        .await?;
    if !check.ok {
        warn!(delivery_id = %delivery.id, destination = %delivery.destination, missing = ?check.missing, "delivery: required catalog mappings unresolved, dead-lettering");
        let outcome = deliveries
            .record_attempt(delivery, &ConnectorResponse::missing_mapping(&check.missing))
            .await?;
        return Ok(Some(outcome));
    }

    let ctx = ProjectionContext {
        tenant_id: delivery.tenant_id,
        partner_id: delivery.partner_id,
        agent_id: delivery.agent_id,
        destination: &delivery.destination,
        external_agent_id: None,
        external_listing_id: existing_mapping.as_ref().and_then(|m| m.external_listing_id.clone()),
    };
    let payload = projection.project(&listing, &ctx, mappings).await?;

    let response = connector.publish_listing(&payload, &secret).await;
    info!(delivery_id = %delivery.id, destination = %delivery.destination, ok = response.ok, "delivery: connector responded");

    if response.ok {
        external_mappings
            .upsert(
                delivery.tenant_id,
                delivery.partner_id,
                delivery.agent_id,
                delivery.listing_id,
                &delivery.destination,
                response.external_id.as_deref(),
                &content_hash,
            )
            .await?;
    }

    let outcome = deliveries.record_attempt(delivery, &response).await?;
    Ok(Some(outcome))
}
