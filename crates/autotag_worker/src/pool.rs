//! Bounded job executor with at-least-once retry.
//!
//! - Default: 3 retries with 2s, 4s, 8s delays
//! - Permanent errors end the job immediately as `Rejected`
//! - Fatal errors end it immediately as `Failed`
//! - Transient errors past the retry budget end it as `Failed`
//!
//! A caller waits on its [`JobTicket`] with a deadline. Giving up on the
//! ticket does not stop the job; it runs to completion and a late success
//! still marks its idempotency key.

use autotag_protocol::{JobId, JobReceipt, JobRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::JobError;
use crate::metrics::ATTEMPTS;
use crate::runner::JobHandler;

/// Exponential backoff between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(60),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `retry` (0-indexed):
    /// `initial_delay * backoff_multiplier^retry`, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(retry as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Job {0} did not finish within {1:?}")]
    Timeout(JobId, Duration),

    /// The job task ended without reporting, e.g. it panicked.
    #[error("Job {0} ended without a receipt")]
    Lost(JobId),
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobTicket {
    id: JobId,
    rx: oneshot::Receiver<JobReceipt>,
}

impl JobTicket {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait up to `timeout` for the job's final receipt.
    pub async fn wait(self, timeout: Duration) -> Result<JobReceipt, TicketError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(_)) => Err(TicketError::Lost(self.id)),
            Err(_) => Err(TicketError::Timeout(self.id, timeout)),
        }
    }
}

/// Runs jobs on the tokio runtime, at most `concurrency` at a time.
pub struct WorkerPool {
    handler: Arc<dyn JobHandler>,
    permits: Arc<Semaphore>,
    retry: RetryConfig,
    next_id: AtomicU64,
}

impl WorkerPool {
    pub fn new(handler: Arc<dyn JobHandler>, concurrency: usize, retry: RetryConfig) -> Self {
        let concurrency = concurrency.max(1);
        info!(concurrency, max_retries = retry.max_retries, "Worker pool ready");
        Self {
            handler,
            permits: Arc::new(Semaphore::new(concurrency)),
            retry,
            next_id: AtomicU64::new(1),
        }
    }

    /// Queue a job. Must be called from within a tokio runtime.
    pub fn submit(&self, request: JobRequest) -> JobTicket {
        let id = JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        let handler = Arc::clone(&self.handler);
        let permits = Arc::clone(&self.permits);
        let retry = self.retry;

        debug!(job_id = %id, kind = %request.kind, node_ref = %request.event.node_ref, "Job submitted");

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(job_id = %id, "Worker pool closed before job started");
                return;
            };
            let receipt = execute_with_retry(handler.as_ref(), &request, &retry, id).await;
            if tx.send(receipt).is_err() {
                debug!(job_id = %id, "Job finished after its caller stopped waiting");
            }
        });

        JobTicket { id, rx }
    }
}

/// Run `request` until it succeeds, fails permanently, or exhausts retries.
async fn execute_with_retry(
    handler: &dyn JobHandler,
    request: &JobRequest,
    retry: &RetryConfig,
    id: JobId,
) -> JobReceipt {
    let node_ref = request.event.node_ref.as_str();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err: JobError = match handler.run(request).await {
            Ok(receipt) => {
                info!(job_id = %id, node_ref, status = ?receipt.status, attempt, "Job finished");
                return receipt.with_metric(ATTEMPTS, attempt as i64);
            }
            Err(err) => err,
        };

        if err.is_fatal() {
            error!(
                job_id = %id,
                node_ref,
                stage = %err.stage(),
                error = %err,
                "Job failed (not retryable)"
            );
            return JobReceipt::failed(err.stage(), err.message())
                .with_metric(ATTEMPTS, attempt as i64);
        }

        if err.is_permanent() {
            warn!(
                job_id = %id,
                node_ref,
                stage = %err.stage(),
                error = %err,
                "Job rejected (permanent failure)"
            );
            return JobReceipt::rejected(err.stage(), err.message())
                .with_metric(ATTEMPTS, attempt as i64);
        }

        if attempt > retry.max_retries {
            error!(
                job_id = %id,
                node_ref,
                stage = %err.stage(),
                attempts = attempt,
                error = %err,
                "Job failed after exhausting retries"
            );
            return JobReceipt::failed(err.stage(), err.message())
                .with_metric(ATTEMPTS, attempt as i64);
        }

        let delay = retry.delay_for_retry(attempt - 1);
        warn!(
            job_id = %id,
            node_ref,
            stage = %err.stage(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autotag_protocol::{JobKind, JobStatus, RepoEvent, Stage};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn request() -> JobRequest {
        let event = RepoEvent::from_json(
            br#"{"nodeRef":"workspace://SpacesStore/abc","eventType":"CONTENT_READY"}"#,
        )
        .unwrap();
        JobRequest::new(JobKind::Tagging, event)
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig::new(
            max_retries,
            Duration::from_millis(1),
            Duration::from_millis(5),
            2.0,
        )
    }

    /// Plays back a fixed sequence of outcomes, then succeeds.
    struct Scripted {
        outcomes: Mutex<Vec<Result<JobReceipt, JobError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<JobReceipt, JobError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl JobHandler for Scripted {
        async fn run(&self, _request: &JobRequest) -> Result<JobReceipt, JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                Ok(JobReceipt::success())
            } else {
                outcomes.remove(0)
            }
        }
    }

    fn transient() -> Result<JobReceipt, JobError> {
        Err(JobError::transient(Stage::Download, "connection reset"))
    }

    #[test]
    fn test_default_delays() {
        let retry = RetryConfig::default();
        let delays: Vec<u64> = (0..retry.max_retries)
            .map(|r| retry.delay_for_retry(r).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8]);
    }

    #[test]
    fn test_delay_is_capped() {
        let retry = RetryConfig::new(10, Duration::from_secs(1), Duration::from_secs(30), 2.0);
        assert_eq!(retry.delay_for_retry(9), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let handler = Scripted::new(vec![transient(), transient()]);
        let pool = WorkerPool::new(handler.clone(), 1, fast_retry(3));

        let receipt = pool.submit(request()).wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(receipt.status, JobStatus::Success);
        assert_eq!(receipt.metric(ATTEMPTS), Some(3));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_rejected_without_retry() {
        let handler = Scripted::new(vec![Err(JobError::permanent(
            Stage::Extract,
            "Unsafe ZIP entry: ../x",
        ))]);
        let pool = WorkerPool::new(handler.clone(), 1, fast_retry(3));

        let receipt = pool.submit(request()).wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(receipt.status, JobStatus::Rejected);
        assert_eq!(receipt.stage, Some(Stage::Extract));
        assert!(receipt.acknowledge());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_failure_fails_without_retry() {
        let handler = Scripted::new(vec![Err(JobError::fatal(
            Stage::ApplyTags,
            "nodes/n1/tags returned HTTP 401",
        ))]);
        let pool = WorkerPool::new(handler.clone(), 1, fast_retry(3));

        let receipt = pool.submit(request()).wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(receipt.status, JobStatus::Failed);
        assert_eq!(receipt.stage, Some(Stage::ApplyTags));
        assert!(!receipt.acknowledge());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let handler = Scripted::new(vec![transient(), transient(), transient(), transient()]);
        let pool = WorkerPool::new(handler.clone(), 1, fast_retry(2));

        let receipt = pool.submit(request()).wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(receipt.status, JobStatus::Failed);
        assert!(!receipt.acknowledge());
        assert_eq!(receipt.metric(ATTEMPTS), Some(3));
    }

    #[tokio::test]
    async fn test_timeout_does_not_cancel_the_job() {
        let handler = Scripted::slow(Duration::from_millis(100));
        let pool = WorkerPool::new(handler.clone(), 1, fast_retry(0));

        let err = pool
            .submit(request())
            .wait(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::Timeout(..)));

        // The job keeps the permit until it finishes; a second job only
        // starts once the first has run to completion.
        let receipt = pool.submit(request()).wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(receipt.status, JobStatus::Success);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    /// Records the highest number of overlapping runs.
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for Gauge {
        async fn run(&self, _request: &JobRequest) -> Result<JobReceipt, JobError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(JobReceipt::success())
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pool = WorkerPool::new(gauge.clone(), 2, fast_retry(0));

        let tickets: Vec<JobTicket> = (0..6).map(|_| pool.submit(request())).collect();
        for ticket in tickets {
            ticket.wait(Duration::from_secs(5)).await.unwrap();
        }

        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
        assert!(gauge.peak.load(Ordering::SeqCst) >= 1);
    }
}
