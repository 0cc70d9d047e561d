//! Thin admin routes over `hub-catalog`/`hub-delivery` services: catalog-set
//! lifecycle (internal-admin only) and partner-scoped delivery listing.
//! Grounded on `original_source/app/api/v1/endpoints/{catalog_sets_admin,
//! deliveries}.py` — both are dependency-injected CRUD wrappers with no
//! business logic of their own; the logic lives in the services they call.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hub_catalog::{NewSetItem, SetItemKind};
use hub_common::HubError;

use crate::auth::{Actor, InternalAdmin};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCatalogSetRequest {
    pub destination: String,
    pub country_code: String,
}

#[derive(Debug, Serialize)]
pub struct CatalogSetIdResponse {
    pub catalog_set_id: Uuid,
}

pub async fn create_catalog_set(
    State(state): State<Arc<AppState>>,
    _admin: InternalAdmin,
    Json(body): Json<CreateCatalogSetRequest>,
) -> Result<(StatusCode, Json<CatalogSetIdResponse>), ApiError> {
    let id = state
        .catalog_sets
        .create_draft(&body.destination, &body.country_code)
        .await?;
    state
        .audit
        .append(
            None,
            "internal-admin",
            "catalog_set.create",
            serde_json::json!({
                "catalog_set_id": id,
                "destination": body.destination,
                "country_code": body.country_code,
            }),
        )
        .await;
    Ok((
        StatusCode::CREATED,
        Json(CatalogSetIdResponse { catalog_set_id: id }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AddCatalogSetItemRequest {
    pub kind: String,
    pub namespace: Option<String>,
    pub source_key_or_geo_key: String,
    pub destination_value: String,
}

#[derive(Debug, Serialize)]
pub struct CatalogSetItemIdResponse {
    pub item_id: Uuid,
}

pub async fn add_catalog_set_item(
    State(state): State<Arc<AppState>>,
    _admin: InternalAdmin,
    Path(catalog_set_id): Path<Uuid>,
    Json(body): Json<AddCatalogSetItemRequest>,
) -> Result<Json<CatalogSetItemIdResponse>, ApiError> {
    let kind = match body.kind.as_str() {
        "enum" => SetItemKind::Enum,
        "geo" => SetItemKind::Geo,
        other => {
            return Err(HubError::validation(format!("unknown catalog set item kind: {other}")).into())
        }
    };

    let item_id = state
        .catalog_sets
        .add_item(
            catalog_set_id,
            NewSetItem {
                kind,
                namespace: body.namespace.clone(),
                source_key_or_geo_key: body.source_key_or_geo_key.clone(),
                destination_value: body.destination_value.clone(),
            },
        )
        .await?;

    state
        .audit
        .append(
            None,
            "internal-admin",
            "catalog_set.add_item",
            serde_json::json!({
                "catalog_set_id": catalog_set_id,
                "item_id": item_id,
                "kind": body.kind,
                "namespace": body.namespace,
                "source_key_or_geo_key": body.source_key_or_geo_key,
                "destination_value": body.destination_value,
            }),
        )
        .await;

    Ok(Json(CatalogSetItemIdResponse { item_id }))
}

#[derive(Debug, Serialize)]
pub struct ImportRunResponse {
    pub import_run_id: Uuid,
    pub inserted: u32,
    pub updated: u32,
    pub noop: u32,
    pub invalid: u32,
}

pub async fn preview_catalog_set(
    State(state): State<Arc<AppState>>,
    _admin: InternalAdmin,
    Path(catalog_set_id): Path<Uuid>,
) -> Result<Json<ImportRunResponse>, ApiError> {
    let run = state.catalog_sets.preview(catalog_set_id).await?;
    Ok(Json(ImportRunResponse {
        import_run_id: run.id,
        inserted: run.inserted,
        updated: run.updated,
        noop: run.noop,
        invalid: run.invalid,
    }))
}

pub async fn submit_catalog_set(
    State(state): State<Arc<AppState>>,
    _admin: InternalAdmin,
    Path(catalog_set_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.catalog_sets.submit(catalog_set_id).await?;
    state
        .audit
        .append(
            None,
            "internal-admin",
            "catalog_set.submit",
            serde_json::json!({"catalog_set_id": catalog_set_id}),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reject_catalog_set(
    State(state): State<Arc<AppState>>,
    _admin: InternalAdmin,
    Path(catalog_set_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.catalog_sets.reject(catalog_set_id).await?;
    state
        .audit
        .append(
            None,
            "internal-admin",
            "catalog_set.reject",
            serde_json::json!({"catalog_set_id": catalog_set_id}),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub actor: String,
}

pub async fn activate_catalog_set(
    State(state): State<Arc<AppState>>,
    _admin: InternalAdmin,
    Path(catalog_set_id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> Result<StatusCode, ApiError> {
    state
        .catalog_sets
        .activate(catalog_set_id, &body.actor)
        .await?;
    state
        .audit
        .append(
            None,
            &body.actor,
            "catalog_set.activate",
            serde_json::json!({"catalog_set_id": catalog_set_id}),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rollback_catalog_set(
    State(state): State<Arc<AppState>>,
    _admin: InternalAdmin,
    Path(to_catalog_set_id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> Result<StatusCode, ApiError> {
    state
        .catalog_sets
        .rollback(to_catalog_set_id, &body.actor)
        .await?;
    state
        .audit
        .append(
            None,
            &body.actor,
            "catalog_set.rollback",
            serde_json::json!({"to_catalog_set_id": to_catalog_set_id}),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DeliveryListItem {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub agent_id: Uuid,
    pub destination: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListDeliveriesQuery {
    pub status: Option<String>,
}

pub async fn list_partner_deliveries(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(partner_id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<Vec<DeliveryListItem>>, ApiError> {
    if !actor.is_partner_admin() || actor.partner_id != partner_id {
        return Err(HubError::forbidden("cannot view another partner's deliveries").into());
    }

    let rows: Vec<DeliveryListItem> = sqlx::query_as(
        r#"
        SELECT id, listing_id, agent_id, destination, status, attempts, last_error
        FROM deliveries
        WHERE tenant_id = $1 AND partner_id = $2
          AND ($3::text IS NULL OR status = $3)
        ORDER BY id
        LIMIT 200
        "#,
    )
    .bind(actor.tenant_id)
    .bind(partner_id)
    .bind(query.status.as_deref())
    .fetch_all(&state.pool)
    .await
    .map_err(hub_common::HubError::from)?;

    Ok(Json(rows))
}
