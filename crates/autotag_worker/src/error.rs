use autotag_protocol::{ErrorKind, Stage};
use autotag_repository::RepositoryError;
use thiserror::Error;

use crate::idempotency::StoreError;

// ============================================================================
// Error Types
// ============================================================================

/// Job failures with retry classification.
///
/// - Permanent: invalid or unsafe package; retrying will not help and the
///   event itself is at fault, the job ends as `Rejected` (acknowledged)
/// - Fatal: the repository refused a call (401, 403, 400, ...); retrying will
///   not help but the event is fine, the job ends as `Failed` (not acknowledged)
/// - Transient: repository or store unavailable, binary not yet readable;
///   eligible for retry
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Permanent error at {stage} (no retry): {message}")]
    Permanent { stage: Stage, message: String },

    #[error("Fatal error at {stage} (no retry): {message}")]
    Fatal { stage: Stage, message: String },

    #[error("Transient error at {stage} (retry eligible): {message}")]
    Transient { stage: Stage, message: String },
}

impl JobError {
    pub fn permanent(stage: Stage, message: impl Into<String>) -> Self {
        JobError::Permanent {
            stage,
            message: message.into(),
        }
    }

    pub fn fatal(stage: Stage, message: impl Into<String>) -> Self {
        JobError::Fatal {
            stage,
            message: message.into(),
        }
    }

    pub fn transient(stage: Stage, message: impl Into<String>) -> Self {
        JobError::Transient {
            stage,
            message: message.into(),
        }
    }

    /// Classify a repository failure using its default retry policy.
    ///
    /// A refused call is never the event's fault, so it is `Fatal`, never
    /// `Permanent`.
    pub fn repository(stage: Stage, err: RepositoryError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Permanent => JobError::Fatal { stage, message },
            ErrorKind::Transient => JobError::Transient { stage, message },
        }
    }

    /// Store outages are always retryable.
    pub fn store(err: StoreError) -> Self {
        JobError::transient(Stage::Idempotency, err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Permanent { .. } | JobError::Fatal { .. } => ErrorKind::Permanent,
            JobError::Transient { .. } => ErrorKind::Transient,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            JobError::Permanent { stage, .. }
            | JobError::Fatal { stage, .. }
            | JobError::Transient { stage, .. } => *stage,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            JobError::Permanent { message, .. }
            | JobError::Fatal { message, .. }
            | JobError::Transient { message, .. } => message,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::Transient { .. })
    }

    /// The event is invalid; the job ends as `Rejected`.
    pub fn is_permanent(&self) -> bool {
        matches!(self, JobError::Permanent { .. })
    }

    /// Not retryable, but the event should be delivered again later.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JobError::Fatal { .. })
    }
}
