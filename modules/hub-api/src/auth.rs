//! API-key authentication. Grounded on `original_source/app/services/auth.py`
//! (`Actor` dataclass, `require_partner_admin`/`require_agent` role guards)
//! and `app/core/security.py::hash_api_key` (pepper-salted SHA-256), adapted
//! into an axum `FromRequestParts` extractor the way the teacher's
//! `AdminSession` extractor in `rootsignal-api/src/auth.rs` reads a header
//! and looks the principal up against `AppState`.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    tenant_id: Uuid,
    partner_id: Uuid,
    role: String,
    agent_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ApiKeyStore {
    pool: PgPool,
}

impl ApiKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_active(&self, key_hash: &str) -> Result<Option<ApiKeyRow>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, tenant_id, partner_id, role, agent_id
            FROM api_keys WHERE key_hash = $1 AND is_active = true
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
    }
}

pub fn hash_api_key(plain: &str, pepper: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plain.as_bytes());
    hasher.update(pepper.as_bytes());
    hex::encode(hasher.finalize())
}

/// The authenticated caller: a partner-admin key (free to name any
/// `agent_id` on an ingest request) or an agent key (locked to its own
/// `agent_id`).
#[derive(Debug, Clone)]
pub struct Actor {
    pub api_key_id: Uuid,
    pub tenant_id: Uuid,
    pub partner_id: Uuid,
    pub role: String,
    pub agent_id: Option<Uuid>,
}

impl Actor {
    pub fn is_partner_admin(&self) -> bool {
        self.role == "partner_admin"
    }
}

pub struct AuthError(StatusCode, &'static str);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.0, axum::Json(serde_json::json!({"detail": self.1}))).into_response()
    }
}

impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError(StatusCode::UNAUTHORIZED, "missing X-API-Key"))?;

        let key_hash = hash_api_key(api_key, &state.config.api_key_pepper);

        let row = state
            .api_keys
            .find_active(&key_hash)
            .await
            .map_err(|_| AuthError(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))?
            .ok_or(AuthError(StatusCode::UNAUTHORIZED, "invalid API key"))?;

        Ok(Actor {
            api_key_id: row.id,
            tenant_id: row.tenant_id,
            partner_id: row.partner_id,
            role: row.role,
            agent_id: row.agent_id,
        })
    }
}

pub struct InternalAdmin;

impl FromRequestParts<Arc<AppState>> for InternalAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get("x-internal-admin-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError(StatusCode::UNAUTHORIZED, "missing X-Internal-Admin-Key"))?;

        if state.config.internal_admin_key.is_empty()
            || provided != state.config.internal_admin_key
        {
            return Err(AuthError(StatusCode::UNAUTHORIZED, "invalid internal admin key"));
        }
        Ok(InternalAdmin)
    }
}
