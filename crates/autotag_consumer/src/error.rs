use autotag_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Failures of the broker connection. All of them end the receive loop.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Broker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame from broker: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("STOMP handshake failed: {0}")]
    Handshake(String),

    #[error("Broker reported an error: {0}")]
    Broker(String),

    #[error("Broker closed the connection")]
    ConnectionClosed,

    #[error("Nothing received from broker for {0:?}")]
    HeartbeatTimeout(Duration),
}
