//! Minimal agent lookup for the ingest/dispatch path: just enough of the
//! `agents` row to resolve `rules.allowed_destinations` when the outbox
//! dispatcher fans a `listing.upserted` event out into deliveries.
//! Grounded on `original_source/worker/tasks.py`'s `agent.rules.get(
//! "allowed_destinations", [])` read.

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use hub_common::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub partner_id: Uuid,
    pub rules: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
struct AgentRules {
    #[serde(default)]
    allowed_destinations: Vec<String>,
}

impl AgentRow {
    pub fn allowed_destinations(&self) -> Vec<String> {
        serde_json::from_value::<AgentRules>(self.rules.clone())
            .unwrap_or_default()
            .allowed_destinations
    }
}

#[derive(Clone)]
pub struct AgentStore {
    pool: PgPool,
}

impl AgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, agent_id: Uuid) -> Result<Option<AgentRow>> {
        let row = sqlx::query_as(
            "SELECT id, tenant_id, partner_id, rules FROM agents WHERE id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
