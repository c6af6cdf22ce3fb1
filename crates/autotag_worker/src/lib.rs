//! # autotag_worker
//!
//! Job layer: everything that runs after the intake controller has decided
//! an event is worth handling.
//!
//! - [`tagging`]: rule discovery, rule loading, matching and tag application
//! - [`package`]: archive download, manifest detection, safe extraction and
//!   structure-preserving upload
//! - [`idempotency`]: shared "already handled" markers
//! - [`runner`]: idempotency guard around the two job kinds
//! - [`pool`]: bounded-concurrency executor with exponential-backoff retry
//!
//! Failures carry an explicit [`ErrorKind`](autotag_protocol::ErrorKind):
//! permanent failures end a job as `Rejected` (acknowledged, logged for
//! follow-up), transient failures are retried and end as `Failed` once the
//! retry budget is spent.

pub mod error;
pub mod idempotency;
pub mod package;
pub mod pool;
pub mod rules;
pub mod runner;
pub mod tagging;

pub use error::JobError;
pub use idempotency::{IdempotencyStore, MemoryStore, RedisStore, StoreError};
pub use pool::{JobTicket, RetryConfig, TicketError, WorkerPool};
pub use runner::{JobHandler, JobRunner};

/// Receipt metric names.
pub mod metrics {
    pub const TAGS_ADDED: &str = "tags_added";
    pub const FOLDERS_CREATED: &str = "folders_created";
    pub const FILES_UPLOADED: &str = "files_uploaded";
    pub const ATTEMPTS: &str = "attempts";
}
