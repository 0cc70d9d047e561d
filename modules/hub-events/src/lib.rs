//! Generic append-only Postgres logs shared by the rest of the hub: the
//! transactional outbox (C4), the idempotency store (C11), the audit log
//! (C12), and the fixed-window rate limiter (C13). None of these know
//! anything about listings, destinations, or deliveries — they are pure
//! plumbing, in the spirit of the teacher's domain-agnostic `EventStore`.

pub mod audit;
pub mod idempotency;
pub mod outbox;
pub mod rate_limit;

pub use audit::AuditLog;
pub use idempotency::{IdempotencyOutcome, IdempotencyStore};
pub use outbox::{ClaimedEvent, NewOutboxEvent, OutboxStore};
pub use rate_limit::{RateLimitResult, RateLimiter};
