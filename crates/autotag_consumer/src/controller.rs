//! Per-message decision: validate, route, dispatch, acknowledge or not.
//!
//! The only outcomes that acknowledge are an event type nobody handles and a
//! job receipt that allows it. Invalid payloads, missing routing headers,
//! failed jobs and timeouts all leave the message to the broker's redelivery.

use async_trait::async_trait;
use autotag_protocol::{Command, EventType, Frame, JobReceipt, JobRequest, JobStatus, RepoEvent};
use autotag_worker::{TicketError, WorkerPool};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Hands a job to the execution layer and waits for its receipt.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        request: JobRequest,
        timeout: Duration,
    ) -> Result<JobReceipt, TicketError>;
}

#[async_trait]
impl Dispatcher for WorkerPool {
    async fn dispatch(
        &self,
        request: JobRequest,
        timeout: Duration,
    ) -> Result<JobReceipt, TicketError> {
        self.submit(request).wait(timeout).await
    }
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Valid event of a type no job handles.
    Filtered(EventType),
    /// The job ran to a final receipt.
    Completed(JobStatus),
    /// Body is not a valid event.
    Invalid(String),
    /// MESSAGE without `ack` or `subscription` headers.
    Unroutable,
    /// The job did not report back in time.
    Unfinished(String),
    /// Not a MESSAGE frame.
    Ignored(Command),
}

impl Disposition {
    pub fn should_ack(&self) -> bool {
        match self {
            Disposition::Filtered(_) => true,
            Disposition::Completed(status) => status.acknowledge(),
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Handled {
    pub disposition: Disposition,
    /// ACK frame to write, present iff the disposition allows it.
    pub ack: Option<Frame>,
}

pub struct Controller<D> {
    dispatcher: D,
    timeout: Duration,
}

impl<D: Dispatcher> Controller<D> {
    pub fn new(dispatcher: D, timeout: Duration) -> Self {
        Self {
            dispatcher,
            timeout,
        }
    }

    pub async fn handle(&self, frame: &Frame) -> Handled {
        let (disposition, ack) = match (frame.get("ack"), frame.get("subscription")) {
            _ if frame.command != Command::Message => {
                (Disposition::Ignored(frame.command), None)
            }
            (Some(ack_id), Some(subscription)) => {
                let disposition = self.decide(ack_id, &frame.body).await;
                let ack = disposition
                    .should_ack()
                    .then(|| Frame::ack(ack_id, subscription));
                (disposition, ack)
            }
            _ => {
                warn!(
                    message_id = frame.get("message-id").unwrap_or("-"),
                    "MESSAGE without ack/subscription headers, cannot acknowledge"
                );
                (Disposition::Unroutable, None)
            }
        };
        Handled { disposition, ack }
    }

    async fn decide(&self, ack_id: &str, body: &[u8]) -> Disposition {
        let event = match RepoEvent::from_json(body) {
            Ok(event) => event,
            Err(e) => {
                error!(ack_id, error = %e, "Invalid event payload, leaving unacknowledged");
                return Disposition::Invalid(e.to_string());
            }
        };
        let node_ref = event.node_ref.clone();
        let node_ref = node_ref.as_str();

        let Some(kind) = event.event_type.job_kind() else {
            debug!(ack_id, node_ref, event_type = %event.event_type, "No job for event type, acknowledging");
            return Disposition::Filtered(event.event_type);
        };

        info!(ack_id, node_ref, job = %kind, "Dispatching job");
        let request = JobRequest::new(kind, event);
        match self.dispatcher.dispatch(request, self.timeout).await {
            Ok(receipt) if receipt.acknowledge() => {
                info!(
                    ack_id,
                    node_ref,
                    status = ?receipt.status,
                    stage = ?receipt.stage,
                    message = receipt.message.as_deref().unwrap_or(""),
                    "Job finished, acknowledging"
                );
                Disposition::Completed(receipt.status)
            }
            Ok(receipt) => {
                error!(
                    ack_id,
                    node_ref,
                    stage = ?receipt.stage,
                    message = receipt.message.as_deref().unwrap_or(""),
                    "Job failed, leaving unacknowledged"
                );
                Disposition::Completed(receipt.status)
            }
            Err(e) => {
                error!(ack_id, node_ref, error = %e, "Job did not finish, leaving unacknowledged");
                Disposition::Unfinished(e.to_string())
            }
        }
    }
}
