//! Canonical default values shared by the intake process and the job layer.

pub const DEFAULT_BROKER_HOST: &str = "localhost";
pub const DEFAULT_BROKER_PORT: u16 = 61613;
pub const DEFAULT_QUEUE: &str = "/queue/alfresco.upload.events";
pub const DEFAULT_SUBSCRIPTION_ID: &str = "queue-consumer";
pub const DEFAULT_PREFETCH: u32 = 1;
pub const DEFAULT_HEARTBEAT_OUT_MS: u64 = 10_000;
pub const DEFAULT_HEARTBEAT_IN_MS: u64 = 10_000;
/// Largest inbound STOMP frame the decoder will buffer, headers included.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/2";

/// Seconds the intake controller waits for a dispatched job.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-request timeout for repository API calls.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
/// Page size used when listing folder children.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Label of the repository root as it appears in event paths.
pub const REPOSITORY_ROOT_LABEL: &str = "Company Home";
/// Top-level folder holding the rule files, mirroring the content tree.
pub const RULE_ROOT: &str = "RULE_BASED_TAGS";
/// Case-insensitive suffix identifying a rule file.
pub const RULE_FILE_SUFFIX: &str = "_tags.csv";

/// Manifest that marks an archive as a content package.
pub const PACKAGE_MANIFEST: &str = "imsmanifest.xml";
pub const ARCHIVE_EXTENSION: &str = "zip";
/// Declared content types accepted for package archives.
pub const ARCHIVE_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-zip",
    "multipart/x-zip",
    "application/octet-stream",
];
