use autotag_protocol::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by repository API calls.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Transport failure: connect, timeout, reset.
    #[error("Request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success response other than 404.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Not found: {endpoint}")]
    NotFound { endpoint: String },

    #[error("Unexpected response body from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid repository configuration: {0}")]
    Config(String),
}

impl RepositoryError {
    /// Default retry classification.
    ///
    /// Transport failures, 404, 408, 429 and 5xx are transient; other 4xx
    /// responses and undecodable bodies are permanent.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::Http { .. }
            | RepositoryError::NotFound { .. }
            | RepositoryError::Io { .. } => ErrorKind::Transient,
            RepositoryError::Status { status, .. } => match status {
                408 | 429 => ErrorKind::Transient,
                s if *s >= 500 => ErrorKind::Transient,
                _ => ErrorKind::Permanent,
            },
            RepositoryError::Decode { .. } | RepositoryError::Config(_) => ErrorKind::Permanent,
        }
    }

    /// HTTP 409: the resource already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Status { status: 409, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}
