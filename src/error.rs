//! Error types for the latency probe

use thiserror::Error;

/// Main error type for the probe
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    /// The relay outbound loop waited on a hand-off queue that was closed
    /// and empty, so no reply can be correlated anymore.
    #[error("Relay correlation queue closed before the sentinel was relayed")]
    CorrelationStarvation,

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire framing errors. Always recovered per packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame too short: {len} bytes, need at least {needed}")]
    FrameTooShort { len: usize, needed: usize },
}

/// Transport errors (bind/send/receive). Fatal to the owning loop.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed on {addr}: {source}")]
    BindFailed {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Send to {peer} failed: {source}")]
    SendFailed {
        peer: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Buffer overflow")]
    BufferOverflow,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Aggregation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("No samples were received, nothing to aggregate")]
    InsufficientData,
}

/// Result type alias for the probe
pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
