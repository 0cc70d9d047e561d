//! Ingest pipeline (C1-C3): the `canonical.listing@1.0` schema, the adapter
//! registry that maps partner-native payloads onto it, and the ingest
//! service that persists the result and appends the outbox event.

pub mod adapter;
pub mod agent;
pub mod canonical;
pub mod ingest;

pub use adapter::{AdapterContext, AdapterRegistry, AdapterResult, PartnerAdapter};
pub use agent::{AgentRow, AgentStore};
pub use canonical::{validate_canonical, ListingCanonicalV1, ValidationError};
pub use ingest::{IngestOutcome, IngestService, Listing};
