//! Delivery dispatcher: claims due `deliveries` rows (first attempt or a
//! retry whose backoff has elapsed) and dispatches each to its destination
//! connector. Collapses the original's separate announce/consume hop
//! (`dispatcher.py` enqueues, `tasks_publish.py` consumes) into one poll
//! loop, since retries here are driven by `next_retry_at` in the database
//! rather than by a second queue message.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hub_catalog::MappingStore;
use hub_common::Config;
use hub_delivery::{
    AgentCredentialStore, ConnectorRegistry, CredentialCipher, DeliveryStore,
    ListingExternalMappingStore, ProjectionRegistry,
};
use hub_worker::publish_delivery;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const BATCH_SIZE: i64 = 25;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hub=info".parse()?))
        .init();

    info!("hub delivery-dispatcher starting...");

    let config = Config::worker_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let deliveries = DeliveryStore::new(pool.clone());
    let credentials = AgentCredentialStore::new(pool.clone());
    let mappings = MappingStore::new(pool.clone());
    let external_mappings = ListingExternalMappingStore::new(pool.clone());
    let cipher = CredentialCipher::new(config.credentials_encryption_key.clone());
    let connectors = ConnectorRegistry::new();
    let projections = ProjectionRegistry::new();

    loop {
        match deliveries.claim_due(BATCH_SIZE).await {
            Ok(due) if due.is_empty() => {}
            Ok(due) => {
                for delivery in due {
                    let result = publish_delivery(
                        &pool,
                        &deliveries,
                        &credentials,
                        &cipher,
                        &connectors,
                        &projections,
                        &mappings,
                        &external_mappings,
                        &delivery,
                    )
                    .await;

                    if let Err(e) = result {
                        error!(delivery_id = %delivery.id, "delivery: dispatch failed: {e}");
                    }
                }
            }
            Err(e) => error!("delivery: claim_due failed: {e}"),
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
