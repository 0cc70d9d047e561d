//! Outbox dispatcher: claims due `outbox_events` and fans each
//! `listing.upserted` event into per-destination deliveries, announcing the
//! touched delivery ids on the work queue. Grounded on
//! `original_source/worker/dispatcher.py`'s tick loop (`POLL_SECONDS = 2`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hub_common::Config;
use hub_core::AgentStore;
use hub_delivery::DeliveryStore;
use hub_events::OutboxStore;
use hub_worker::{process_claimed_event, InMemoryQueue, LapinQueue, WorkQueue};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const LEASE_DURATION: ChronoDuration = ChronoDuration::seconds(60);
const BATCH_SIZE: i64 = 25;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hub=info".parse()?))
        .init();

    info!("hub outbox-dispatcher starting...");

    let config = Config::worker_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let outbox = OutboxStore::new(pool.clone());
    let agents = AgentStore::new(pool.clone());
    let deliveries = DeliveryStore::new(pool.clone());

    let queue: Arc<dyn WorkQueue> = if config.rabbitmq_url.is_empty() {
        warn!("RABBITMQ_URL not set, delivery announcements stay in-process only");
        Arc::new(InMemoryQueue::new())
    } else {
        Arc::new(LapinQueue::connect(&config.rabbitmq_url).await?)
    };

    loop {
        match outbox.claim_batch(BATCH_SIZE, LEASE_DURATION).await {
            Ok(claimed) if claimed.is_empty() => {}
            Ok(claimed) => {
                for event in claimed {
                    match process_claimed_event(&agents, &deliveries, &event).await {
                        Ok(delivery_ids) => {
                            if !outbox.mark_done(event.id, event.lease_id).await? {
                                warn!(event_id = %event.id, "outbox: lease lost before mark_done, leaving for reclaim");
                                continue;
                            }
                            if !delivery_ids.is_empty() {
                                let payload = serde_json::to_vec(&delivery_ids)
                                    .expect("uuid vec always serializes");
                                if let Err(e) = queue.publish("hub.deliveries", &payload).await {
                                    warn!(event_id = %event.id, "outbox: announcement publish failed: {e}");
                                }
                            }
                        }
                        Err(e) => {
                            error!(event_id = %event.id, "outbox: processing failed: {e}");
                            outbox
                                .requeue_after_error(event.id, event.lease_id, &e.to_string())
                                .await?;
                        }
                    }
                }
            }
            Err(e) => error!("outbox: claim_batch failed: {e}"),
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
