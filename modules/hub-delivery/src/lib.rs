//! Per-destination delivery (C5-C7): connector registry, canonical ->
//! destination projection, encrypted partner credentials, and the delivery
//! state machine with exponential backoff and dead-lettering.

pub mod connector;
pub mod credentials;
pub mod delivery;
pub mod mapping;
pub mod projection;
pub mod settings;

pub use connector::{
    Capabilities, ConnectorRegistry, ConnectorResponse, DestinationConnector,
    ListingInclusionPolicy, Transport,
};
pub use credentials::CredentialCipher;
pub use delivery::{Delivery, DeliveryAttempt, DeliveryStore, DispatchOutcome};
pub use mapping::{ListingExternalMapping, ListingExternalMappingStore};
pub use projection::{MappingCheck, Projection, ProjectionRegistry};
pub use settings::{
    AgentCredentialRow, AgentCredentialStore, PartnerDestinationSetting,
    PartnerDestinationSettingStore,
};
