//! Shared wire and domain types for the autotag intake process and job layer.
//!
//! - [`event`]: the canonical `RepoEvent` schema and the event routing predicate
//! - [`stomp`]: STOMP 1.2 frame codec used by the broker connection
//! - [`idempotency`]: idempotency key derivation
//! - [`types`]: job requests, receipts and failure classification

pub mod defaults;
pub mod error;
pub mod event;
pub mod idempotency;
pub mod stomp;
pub mod types;

pub use error::{ProtocolError, Result};
pub use event::{node_id, EventType, RepoEvent};
pub use idempotency::IdempotencyKey;
pub use stomp::{Command, Frame};
pub use types::{ErrorKind, JobId, JobKind, JobReceipt, JobRequest, JobStatus, Stage};
