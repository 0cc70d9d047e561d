//! Shared types, error taxonomy, configuration and small pure-function
//! utilities used by every crate in the hub workspace.

pub mod config;
pub mod error;
pub mod hashing;
pub mod ids;
pub mod redact;
#[cfg(feature = "test-utils")]
pub mod testutil;

pub use config::Config;
pub use error::{HubError, Result};
pub use hashing::{content_hash, sha256_hex, stable_json};
pub use ids::{AgentId, DestinationKey, ListingId, PartnerId, TenantId};
pub use redact::redact;
