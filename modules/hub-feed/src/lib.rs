//! Hosted-feed engine (C9/C10): fingerprint-gated snapshot generation, an
//! object-store abstraction, and a small set of feed-format plugins.

pub mod fingerprint;
pub mod object_store;
pub mod plugin;
pub mod snapshot;

pub use fingerprint::compute_fingerprint;
pub use object_store::{LocalObjectStore, ObjectStore};
pub use plugin::{FeedPlugin, FeedPluginRegistry, FeedSkip, FeedWarning};
pub use snapshot::{FeedSnapshot, FeedSnapshotStore, SnapshotBuildOutcome};
