//! MCP error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn server `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to server: {0}")]
    Io(#[from] std::io::Error),

    #[error("server not initialized")]
    NotInitialized,

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("timeout waiting for response to {method}")]
    Timeout { method: String },

    #[error("failed to encode or decode message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unsupported protocol version: {0}")]
    ProtocolMismatch(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("output too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },
}

impl Error {
    /// Whether the error means the channel to the server is gone.
    ///
    /// Protocol and remote errors leave the channel usable; these do not.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ServerExited | Self::Io(_) | Self::Spawn { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
