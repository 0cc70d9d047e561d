//! Destination connector registry (C6): capability-typed plugins that push
//! a projected payload to a partner destination, or report that delivery
//! for that destination is driven by the hosted-feed engine instead.
//!
//! Grounded on `original_source/app/destinations/{registry,
//! connector_registry,sample_passthrough_connector}.py`: a `destination ->
//! connector` map, a `capabilities()` descriptor (`transport` in
//! `push_api`/`hosted_feed`/`pull_only`), and a `PublishResult{ok, retryable,
//! ...}` response the delivery worker matches on.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hub_common::{HubError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    PushApi,
    HostedFeed,
    PullOnly,
}

/// Whether a destination wants inactive listings dropped entirely, or kept
/// and tagged with their status so the destination can decide. Grounded on
/// `original_source/app/destinations/base.py`'s `listing_inclusion_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingInclusionPolicy {
    ExcludeInactive,
    IncludeWithStatus,
}

#[derive(Debug, Clone)]
pub struct Capabilities {
    pub transport: Transport,
    pub supports_delete: bool,
    pub listing_inclusion_policy: ListingInclusionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorResponse {
    pub ok: bool,
    pub retryable: bool,
    pub external_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub detail: serde_json::Value,
}

impl ConnectorResponse {
    fn success(external_id: Option<String>, detail: serde_json::Value) -> Self {
        Self {
            ok: true,
            retryable: false,
            external_id,
            error_code: None,
            error_message: None,
            detail,
        }
    }

    /// Synthetic success for destinations whose delivery is actually driven
    /// by the hosted-feed or pull-only path: per-listing dispatch never
    /// reaches the connector, so there is nothing to retry or dead-letter.
    pub fn hosted_feed_noop() -> Self {
        Self::success(None, serde_json::json!({"hosted_feed_noop": true}))
    }

    /// Synthetic success for a listing whose content hash already matches
    /// the destination's last synced hash: nothing changed, so there is
    /// nothing to push.
    pub fn unchanged_noop(external_id: Option<String>) -> Self {
        Self::success(external_id, serde_json::json!({"unchanged": true}))
    }

    pub fn missing_mapping(missing: &[String]) -> Self {
        Self::failure(
            false,
            "MISSING_MAPPING",
            format!("required catalog mapping not resolved: {}", missing.join(", ")),
        )
    }

    fn failure(retryable: bool, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            retryable,
            external_id: None,
            error_code: Some(code.to_string()),
            error_message: Some(message.into()),
            detail: serde_json::Value::Null,
        }
    }
}

/// Classify an HTTP status the way every push-api connector should: 408 and
/// 429 and any 5xx are transient, 401/403/404 and other 4xx are terminal.
pub fn classify_status(status: u16) -> (bool, &'static str) {
    match status {
        408 | 429 => (true, "RATE_LIMITED_OR_TIMEOUT"),
        500..=599 => (true, "UPSTREAM_ERROR"),
        401 | 403 => (false, "UNAUTHORIZED"),
        404 => (false, "NOT_FOUND"),
        200..=299 => (false, "OK"),
        _ => (false, "REJECTED"),
    }
}

#[async_trait]
pub trait DestinationConnector: Send + Sync {
    fn destination(&self) -> &'static str;
    fn capabilities(&self) -> Capabilities;

    async fn publish_listing(
        &self,
        payload: &serde_json::Value,
        credentials: &serde_json::Value,
    ) -> ConnectorResponse;

    async fn delete_listing(
        &self,
        external_listing_id: &str,
        credentials: &serde_json::Value,
    ) -> ConnectorResponse {
        let _ = (external_listing_id, credentials);
        ConnectorResponse::failure(false, "NOT_SUPPORTED", "delete not supported")
    }
}

/// No-op connector used for smoke tests and as the registry default,
/// grounded on `PassthroughDestinationConnector`.
pub struct PassthroughConnector;

#[async_trait]
impl DestinationConnector for PassthroughConnector {
    fn destination(&self) -> &'static str {
        "passthrough"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transport: Transport::PushApi,
            supports_delete: false,
            listing_inclusion_policy: ListingInclusionPolicy::ExcludeInactive,
        }
    }

    async fn publish_listing(
        &self,
        payload: &serde_json::Value,
        _credentials: &serde_json::Value,
    ) -> ConnectorResponse {
        ConnectorResponse::success(
            payload.get("canonical_id").and_then(|v| v.as_str()).map(String::from),
            serde_json::json!({"noop": true}),
        )
    }
}

/// Generic push-API connector for destinations whose protocol is "POST the
/// projected JSON, read the status code", which covers most MLS-style
/// partner APIs the original's adapter-specific connectors wrap.
pub struct GenericHttpConnector {
    destination: &'static str,
    endpoint: String,
    client: reqwest::Client,
}

impl GenericHttpConnector {
    pub fn new(destination: &'static str, endpoint: impl Into<String>) -> Self {
        Self {
            destination,
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
        }
    }
}

#[async_trait]
impl DestinationConnector for GenericHttpConnector {
    fn destination(&self) -> &'static str {
        self.destination
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transport: Transport::PushApi,
            supports_delete: true,
            listing_inclusion_policy: ListingInclusionPolicy::ExcludeInactive,
        }
    }

    async fn publish_listing(
        &self,
        payload: &serde_json::Value,
        credentials: &serde_json::Value,
    ) -> ConnectorResponse {
        let bearer = credentials.get("api_key").and_then(|v| v.as_str());
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let (retryable, code) = classify_status(status);
                if (200..300).contains(&status) {
                    let body = response.json::<serde_json::Value>().await.unwrap_or_default();
                    let external_id = body
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(String::from);
                    ConnectorResponse::success(external_id, body)
                } else {
                    ConnectorResponse::failure(retryable, code, format!("http {status}"))
                }
            }
            Err(err) => ConnectorResponse::failure(true, "TRANSPORT_ERROR", err.to_string()),
        }
    }
}

pub struct ConnectorRegistry {
    connectors: HashMap<String, Box<dyn DestinationConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            connectors: HashMap::new(),
        };
        registry.register(Box::new(PassthroughConnector));
        registry
    }

    pub fn register(&mut self, connector: Box<dyn DestinationConnector>) {
        self.connectors
            .insert(connector.destination().to_string(), connector);
    }

    pub fn get(&self, destination: &str) -> Result<&dyn DestinationConnector> {
        self.connectors
            .get(&destination.to_lowercase())
            .map(|c| c.as_ref())
            .ok_or_else(|| HubError::not_found(format!("no connector registered for destination={destination}")))
    }

    pub fn supported(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.connectors.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
