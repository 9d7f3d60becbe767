use videogenie_core::error::CoreError;

/// Errors raised while opening or reading a status channel.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The job id is empty or malformed.
    #[error(transparent)]
    InvalidJobId(#[from] CoreError),

    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an established channel.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A frame did not carry a valid status event.
    #[error("Invalid status frame: {0}")]
    Decode(String),
}
