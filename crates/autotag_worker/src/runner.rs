use async_trait::async_trait;
use autotag_protocol::{IdempotencyKey, JobKind, JobReceipt, JobRequest, JobStatus};
use autotag_repository::Repository;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::JobError;
use crate::idempotency::IdempotencyStore;
use crate::package::process_package;
use crate::tagging::tag_node;

/// One attempt at a job. The pool calls this again on transient errors.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, request: &JobRequest) -> Result<JobReceipt, JobError>;
}

/// Runs tagging and package jobs behind the idempotency guard.
///
/// A key already in the store short-circuits to `Duplicate` before any
/// repository call. The key is marked only after a successful run, so
/// skipped and rejected events are evaluated again if they are redelivered.
pub struct JobRunner {
    repo: Arc<dyn Repository>,
    store: Arc<dyn IdempotencyStore>,
    ttl: Option<Duration>,
}

impl JobRunner {
    pub fn new(repo: Arc<dyn Repository>, store: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            repo,
            store,
            ttl: None,
        }
    }

    /// Expire idempotency markers after `ttl`; `None` keeps them forever.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl JobHandler for JobRunner {
    async fn run(&self, request: &JobRequest) -> Result<JobReceipt, JobError> {
        let event = &request.event;
        let key = IdempotencyKey::for_job(request.kind, event);

        if self
            .store
            .already_processed(&key)
            .await
            .map_err(JobError::store)?
        {
            info!(key = %key, node_ref = %event.node_ref, "Skipping duplicate");
            return Ok(JobReceipt::duplicate());
        }

        let receipt = match request.kind {
            JobKind::Tagging => tag_node(self.repo.as_ref(), event).await?,
            JobKind::Package => process_package(self.repo.as_ref(), event).await?,
        };

        if receipt.status == JobStatus::Success {
            self.store
                .mark_processed(&key, self.ttl)
                .await
                .map_err(JobError::store)?;
            debug!(key = %key, "Marked processed");
        }
        Ok(receipt)
    }
}
