//! # autotag_consumer
//!
//! Intake process: one STOMP subscription, one message at a time.
//!
//! Each MESSAGE is validated as a `RepoEvent`, routed by event type to a
//! tagging or package job, and acknowledged only when the job's receipt
//! allows it. Anything else is left for the broker to redeliver.

pub mod cancel;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod controller;
pub mod error;

pub use cancel::{CancellationToken, SignalAction};
pub use config::ConsumerArgs;
pub use connection::{BrokerConfig, StompConnection};
pub use consumer::Consumer;
pub use controller::{Controller, Disposition, Dispatcher, Handled};
pub use error::{ConsumerError, Result};
