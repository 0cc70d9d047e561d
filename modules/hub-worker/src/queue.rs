//! Broker abstraction for dispatcher-to-dispatcher notifications. Grounded
//! on `original_source/worker/dispatcher.py`'s `celery.send_task(...,
//! queue="publish")` hop — the outbox dispatcher announces newly-created
//! deliveries onto a queue rather than calling the delivery dispatcher
//! directly. `LapinQueue` is the real RabbitMQ-backed implementation;
//! `InMemoryQueue` backs tests and a broker-less single-process deployment.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};
use tokio::sync::Mutex;

use hub_common::{HubError, Result};

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()>;
}

pub struct LapinQueue {
    connection: Connection,
}

impl LapinQueue {
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| HubError::Other(anyhow::anyhow!("rabbitmq connect failed: {e}")))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl WorkQueue for LapinQueue {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| HubError::Other(anyhow::anyhow!("channel open failed: {e}")))?;

        channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| HubError::Other(anyhow::anyhow!("queue declare failed: {e}")))?;

        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| HubError::Other(anyhow::anyhow!("publish failed: {e}")))?
            .await
            .map_err(|e| HubError::Other(anyhow::anyhow!("publish confirm failed: {e}")))?;

        Ok(())
    }
}

/// In-process stand-in used by tests and single-node deployments that run
/// without a broker — messages are simply dropped after being recorded,
/// since nothing in this crate currently consumes from the queue.
#[derive(Default)]
pub struct InMemoryQueue {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn drain(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.published.lock().await)
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.published
            .lock()
            .await
            .push((queue.to_string(), payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_queue_records_published_messages() {
        let queue = InMemoryQueue::new();
        queue.publish("hub.deliveries", b"hello").await.unwrap();
        let drained = queue.drain().await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, "hub.deliveries");
        assert_eq!(drained[0].1, b"hello");
    }
}
