use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding broker frames or event payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Payload violates RepoEvent schema: {0}")]
    Schema(String),

    #[error("Unknown STOMP command: {0:?}")]
    UnknownCommand(String),

    #[error("Malformed STOMP header line: {0:?}")]
    MalformedHeader(String),

    #[error("Invalid escape sequence in header: {0:?}")]
    InvalidEscape(String),

    #[error("Invalid content-length header: {0:?}")]
    InvalidContentLength(String),

    #[error("Frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("Frame header block is not valid UTF-8")]
    InvalidUtf8,

    #[error("Frame body is not terminated by NUL")]
    MissingNul,
}

impl ProtocolError {
    /// True for payload problems that no amount of redelivery will fix.
    pub fn is_schema_error(&self) -> bool {
        matches!(self, ProtocolError::InvalidJson(_) | ProtocolError::Schema(_))
    }
}
