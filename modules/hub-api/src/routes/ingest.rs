//! `POST /v1/ingest/{partner_key}/listings/{source_listing_id}` (C3 HTTP
//! surface). Grounded on `original_source/app/api/v1/endpoints/ingest.py`:
//! resolve the effective `agent_id` from the caller's role, require the
//! `Idempotency-Key` header, delegate to `IngestService`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hub_common::HubError;

use crate::auth::Actor;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestListingRequest {
    pub agent_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub adapter_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestListingResponse {
    pub listing_id: Option<Uuid>,
    pub source_listing_id: String,
    pub content_hash: Option<String>,
    pub material_change: bool,
    pub ingest_run_id: Uuid,
}

pub async fn ingest_listing(
    State(state): State<Arc<AppState>>,
    Path((partner_key, source_listing_id)): Path<(String, String)>,
    actor: Actor,
    headers: HeaderMap,
    Json(body): Json<IngestListingRequest>,
) -> Result<Json<IngestListingResponse>, ApiError> {
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| HubError::validation("Idempotency-Key header is required"))?
        .to_string();

    let agent_id = match actor.agent_id {
        Some(bound) => {
            if let Some(requested) = body.agent_id {
                if requested != bound {
                    return Err(HubError::forbidden("agent cannot ingest for another agent").into());
                }
            }
            bound
        }
        None => body
            .agent_id
            .ok_or_else(|| HubError::validation("agent_id is required for partner_admin ingest"))?,
    };

    let outcome = state
        .ingest
        .ingest_listing(
            actor.tenant_id,
            actor.partner_id,
            agent_id,
            &partner_key,
            &source_listing_id,
            &idempotency_key,
            body.payload,
            body.adapter_version.as_deref(),
            actor.is_partner_admin(),
        )
        .await?;

    Ok(Json(IngestListingResponse {
        listing_id: outcome.listing.as_ref().map(|l| l.id),
        source_listing_id,
        content_hash: outcome.listing.as_ref().map(|l| l.content_hash.clone()),
        material_change: outcome.material_change,
        ingest_run_id: outcome.ingest_run_id,
    }))
}
