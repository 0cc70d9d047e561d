//! Background dispatchers (C4/C5/C9 tick loops): outbox fan-out into
//! deliveries, per-delivery connector dispatch, and hosted-feed snapshot
//! builds. Grounded on `original_source/worker/{dispatcher,tasks,
//! tasks_publish,publish,feed_dispatcher}.py` — the original runs these as
//! Celery tasks behind a tick-based producer; here each concern is its own
//! poll loop, matching the teacher's one-binary-per-concern `modules/`
//! layout (`rootsignal-scout-supervisor`, `rootsignal-editions`, ...).

pub mod delivery_publisher;
pub mod feed_builder;
pub mod outbox_processor;
pub mod queue;

pub use delivery_publisher::publish_delivery;
pub use feed_builder::build_enabled_feeds;
pub use outbox_processor::process_claimed_event;
pub use queue::{InMemoryQueue, LapinQueue, WorkQueue};
