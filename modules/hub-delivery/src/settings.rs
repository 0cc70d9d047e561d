//! Partner-destination configuration (C5/C9): whether deliveries may be
//! created for a `(tenant, partner, destination)` triple, its transport and
//! feed config, and the per-agent encrypted credentials a connector needs.
//! Grounded on `original_source/app/models/{agent_credential,
//! partner_destination_setting}.py`.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use hub_common::{HubError, Result};

use crate::credentials::CredentialCipher;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentCredentialRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub partner_id: Uuid,
    pub agent_id: Uuid,
    pub destination: String,
    pub auth_type: String,
    pub secret_ciphertext: String,
    pub meta: Value,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct AgentCredentialStore {
    pool: PgPool,
}

impl AgentCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_active(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        agent_id: Uuid,
        destination: &str,
    ) -> Result<Option<AgentCredentialRow>> {
        let row = sqlx::query_as(
            r#"
            SELECT id, tenant_id, partner_id, agent_id, destination, auth_type,
                   secret_ciphertext, meta, is_active
            FROM agent_credentials
            WHERE tenant_id = $1 AND partner_id = $2 AND agent_id = $3
              AND destination = $4 AND is_active = true
            "#,
        )
        .bind(tenant_id)
        .bind(partner_id)
        .bind(agent_id)
        .bind(destination)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Decrypt the stored secret blob into the JSON credentials object a
    /// connector expects (`{"api_key": "...", ...}`).
    pub fn decrypt(&self, cipher: &CredentialCipher, row: &AgentCredentialRow) -> Result<Value> {
        let bytes = cipher.decrypt(&row.secret_ciphertext)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| HubError::Other(anyhow::anyhow!("credential blob is not valid JSON: {e}")))
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PartnerDestinationSetting {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub partner_id: Uuid,
    pub destination: String,
    pub is_enabled: bool,
    pub config: Value,
}

impl PartnerDestinationSetting {
    pub fn transport(&self) -> Option<&str> {
        self.config.get("transport").and_then(|v| v.as_str())
    }
}

#[derive(Clone)]
pub struct PartnerDestinationSettingStore {
    pool: PgPool,
}

impl PartnerDestinationSettingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        destination: &str,
    ) -> Result<Option<PartnerDestinationSetting>> {
        let row = sqlx::query_as(
            r#"
            SELECT id, tenant_id, partner_id, destination, is_enabled, config
            FROM partner_destination_settings
            WHERE tenant_id = $1 AND partner_id = $2 AND destination = $3
            "#,
        )
        .bind(tenant_id)
        .bind(partner_id)
        .bind(destination)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Public hosted-feed lookups are scoped by `partner_id` alone: the feed
    /// URL (`/v1/feeds/{partner}/{destination}.{ext}`) never carries a
    /// tenant segment, and a partner belongs to exactly one tenant.
    pub async fn get_by_partner(
        &self,
        partner_id: Uuid,
        destination: &str,
    ) -> Result<Option<PartnerDestinationSetting>> {
        let row = sqlx::query_as(
            r#"
            SELECT id, tenant_id, partner_id, destination, is_enabled, config
            FROM partner_destination_settings
            WHERE partner_id = $1 AND destination = $2
            "#,
        )
        .bind(partner_id)
        .bind(destination)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_enabled_with_transport(
        &self,
        transport: &str,
    ) -> Result<Vec<PartnerDestinationSetting>> {
        let rows = sqlx::query_as(
            r#"
            SELECT id, tenant_id, partner_id, destination, is_enabled, config
            FROM partner_destination_settings
            WHERE is_enabled = true AND config->>'transport' = $1
            "#,
        )
        .bind(transport)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
