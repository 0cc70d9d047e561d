//! Feed dispatcher: rebuilds every enabled hosted-feed snapshot on a fixed
//! cadence. Grounded on `original_source/worker/feed_dispatcher.py`'s tick
//! loop (`POLL_SECONDS = 30`).

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hub_catalog::MappingStore;
use hub_common::Config;
use hub_delivery::{ConnectorRegistry, PartnerDestinationSettingStore};
use hub_feed::{FeedPluginRegistry, FeedSnapshotStore, LocalObjectStore};
use hub_worker::build_enabled_feeds;

const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hub=info".parse()?))
        .init();

    info!("hub feed-dispatcher starting...");

    let config = Config::worker_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let settings = PartnerDestinationSettingStore::new(pool.clone());
    let snapshots = FeedSnapshotStore::new(pool.clone());
    let mappings = MappingStore::new(pool.clone());
    let registry = FeedPluginRegistry::new();
    let connectors = ConnectorRegistry::new();
    let object_store = LocalObjectStore::new(&config.feed_storage_dir)?;

    loop {
        match build_enabled_feeds(
            &pool,
            &settings,
            &snapshots,
            &registry,
            &mappings,
            &connectors,
            &object_store,
        )
        .await
        {
            Ok(results) => {
                if !results.is_empty() {
                    info!(count = results.len(), "feed: tick processed destinations");
                }
            }
            Err(e) => error!("feed: tick failed: {e}"),
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
