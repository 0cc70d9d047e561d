//! Outbox event fan-out (C4 -> C5 boundary). Grounded on
//! `original_source/worker/tasks.py::_process_outbox_event`: a
//! `listing.upserted` event becomes one pending (or re-pended) `Delivery`
//! row per destination in the listing's agent's `allowed_destinations`.

use tracing::{info, warn};
use uuid::Uuid;

use hub_common::Result;
use hub_core::AgentStore;
use hub_delivery::DeliveryStore;
use hub_events::ClaimedEvent;

/// Returns the ids of deliveries created or re-pended by this event, so the
/// caller can announce them on the work queue.
pub async fn process_claimed_event(
    agents: &AgentStore,
    deliveries: &DeliveryStore,
    event: &ClaimedEvent,
) -> Result<Vec<Uuid>> {
    if event.event_type != "listing.upserted" {
        warn!(event_type = %event.event_type, "outbox: no handler for event type, marking done");
        return Ok(Vec::new());
    }

    let listing_id: Uuid = serde_json::from_value(event.payload["listing_id"].clone())
        .map_err(|e| hub_common::HubError::validation(format!("bad listing_id in payload: {e}")))?;
    let tenant_id: Uuid = serde_json::from_value(event.payload["tenant_id"].clone())
        .map_err(|e| hub_common::HubError::validation(format!("bad tenant_id in payload: {e}")))?;
    let partner_id: Uuid = serde_json::from_value(event.payload["partner_id"].clone())
        .map_err(|e| hub_common::HubError::validation(format!("bad partner_id in payload: {e}")))?;
    let agent_id: Uuid = serde_json::from_value(event.payload["agent_id"].clone())
        .map_err(|e| hub_common::HubError::validation(format!("bad agent_id in payload: {e}")))?;

    let Some(agent) = agents.get(agent_id).await? else {
        warn!(%agent_id, "outbox: listing's agent no longer exists, skipping fan-out");
        return Ok(Vec::new());
    };

    let allowed = agent.allowed_destinations();
    let mut touched = Vec::with_capacity(allowed.len());
    for destination in allowed {
        let id = deliveries
            .upsert_pending(tenant_id, partner_id, agent_id, listing_id, &destination)
            .await?;
        touched.push(id);
    }

    info!(%listing_id, destinations = touched.len(), "outbox: fanned listing.upserted into deliveries");
    Ok(touched)
}
