use thiserror::Error;

/// Top-level error type for the logship agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tail error: {0}")]
    Tail(#[from] TailError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors specific to file tailing and source discovery
#[derive(Debug, Error)]
pub enum TailError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File watch error: {0}")]
    Watch(String),

    #[error("File read error: {0}")]
    Read(String),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Errors specific to batch delivery and heartbeats
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Result type alias for logship operations
pub type Result<T> = std::result::Result<T, AgentError>;
