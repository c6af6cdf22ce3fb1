//! Job payload types exchanged between the intake controller and the worker pool.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::event::RepoEvent;

// ============================================================================
// Identifiers
// ============================================================================

/// Monotonic id assigned by the worker pool when a job is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Which asynchronous job an event triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Rule-based metadata tagging.
    Tagging,
    /// Package detection, extraction and republishing.
    Package,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Tagging => "tagging",
            JobKind::Package => "package",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work submitted to the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub kind: JobKind,
    pub event: RepoEvent,
}

impl JobRequest {
    pub fn new(kind: JobKind, event: RepoEvent) -> Self {
        Self { kind, event }
    }
}

// ============================================================================
// Failure classification
// ============================================================================

/// Retry eligibility of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Retrying will not help (invalid package, unsafe archive entry).
    Permanent,
    /// May succeed later (network failure, binary not yet available).
    Transient,
}

impl ErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Processing stage, recorded on receipts and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idempotency,
    Filter,
    Discovery,
    LoadRules,
    Match,
    ApplyTags,
    Download,
    Detect,
    CreateFolder,
    Extract,
    Upload,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idempotency => "idempotency",
            Stage::Filter => "filter",
            Stage::Discovery => "discovery",
            Stage::LoadRules => "load_rules",
            Stage::Match => "match",
            Stage::ApplyTags => "apply_tags",
            Stage::Download => "download",
            Stage::Detect => "detect",
            Stage::CreateFolder => "create_folder",
            Stage::Extract => "extract",
            Stage::Upload => "upload",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Final status of a job as observed by the intake controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Side effects applied.
    Success,
    /// Benign no-op (no path, no applicable rule, not an archive).
    Skipped,
    /// Idempotency key already marked.
    Duplicate,
    /// Permanent failure, reported as success-equivalent to stop redelivery.
    Rejected,
    /// Transient failure after exhausting retries.
    Failed,
}

impl JobStatus {
    /// Whether the inbound message may be acknowledged.
    pub fn acknowledge(&self) -> bool {
        !matches!(self, JobStatus::Failed)
    }
}

/// Result of a job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReceipt {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub metrics: HashMap<String, i64>, // e.g., {"tags_added": 2, "files_uploaded": 14}
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobReceipt {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            stage: None,
            metrics: HashMap::new(),
            message: None,
        }
    }

    pub fn success() -> Self {
        Self::new(JobStatus::Success)
    }

    pub fn skipped(stage: Stage, reason: impl Into<String>) -> Self {
        Self::new(JobStatus::Skipped)
            .with_stage(stage)
            .with_message(reason)
    }

    pub fn duplicate() -> Self {
        Self::new(JobStatus::Duplicate).with_stage(Stage::Idempotency)
    }

    pub fn rejected(stage: Stage, reason: impl Into<String>) -> Self {
        Self::new(JobStatus::Rejected)
            .with_stage(stage)
            .with_message(reason)
    }

    pub fn failed(stage: Stage, reason: impl Into<String>) -> Self {
        Self::new(JobStatus::Failed)
            .with_stage(stage)
            .with_message(reason)
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metric(mut self, name: &str, value: i64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn metric(&self, name: &str) -> Option<i64> {
        self.metrics.get(name).copied()
    }

    pub fn acknowledge(&self) -> bool {
        self.status.acknowledge()
    }
}
