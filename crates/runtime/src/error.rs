use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::ModelError;

/// Failure to bring a connection to READY.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("tool-server artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("tool-server artifact {} is not executable: {reason}", .path.display())]
    ArtifactNotExecutable { path: PathBuf, reason: String },

    #[error("failed to start tool server: {0}")]
    Spawn(#[source] mcp::Error),

    #[error("handshake timed out after {}s", .0.as_secs_f32())]
    HandshakeTimeout(Duration),

    #[error("handshake failed: {0}")]
    Handshake(#[source] mcp::Error),

    #[error("tool discovery failed: {0}")]
    Discovery(#[source] mcp::Error),

    #[error("tool server reported no tools")]
    NoToolsDiscovered,

    #[error("tool server reported `{0}` more than once")]
    DuplicateTool(String),
}

/// Failure to invoke a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool connection not initialized")]
    NotReady,

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool `{tool}` failed: {message}")]
    Execution { tool: String, message: String },

    #[error("connection to tool server lost: {0}")]
    ConnectionLost(String),
}

impl ToolError {
    /// Whether the failure means the session can no longer be trusted.
    pub fn is_stale_session(&self) -> bool {
        match self {
            Self::NotReady | Self::ConnectionLost(_) => true,
            Self::Execution { message, .. } => message.to_lowercase().contains("not initialized"),
            Self::UnknownTool(_) => false,
        }
    }
}

/// Failure to establish a session.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingCredential,

    #[error("API key validation failed: {0}")]
    InvalidCredential(#[source] ModelError),

    #[error("server file not found: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("failed to connect to tool server after {attempts} attempts: {source}")]
    ConnectFailed {
        attempts: u32,
        #[source]
        source: ConnectError,
    },
}

/// Coarse classification carried by every [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Connect,
    Tool,
    Gateway,
    Session,
}

impl InitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential | Self::InvalidCredential(_) => ErrorKind::Config,
            Self::ArtifactMissing(_) | Self::ConnectFailed { .. } => ErrorKind::Connect,
        }
    }
}

/// Failure of one query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query is required")]
    EmptyQuery,

    #[error("session is not ready")]
    SessionNotReady,

    #[error(transparent)]
    Session(#[from] InitError),

    #[error("model request failed: {0}")]
    Gateway(#[from] ModelError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuery => ErrorKind::Config,
            Self::SessionNotReady => ErrorKind::Session,
            Self::Session(e) => e.kind(),
            Self::Gateway(_) => ErrorKind::Gateway,
            Self::Tool(_) => ErrorKind::Tool,
        }
    }

    /// Whether asking again has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EmptyQuery => false,
            Self::SessionNotReady => true,
            Self::Session(e) => e.kind() == ErrorKind::Connect,
            Self::Gateway(e) => matches!(e, ModelError::Network(_) | ModelError::Timeout(_)),
            Self::Tool(e) => e.is_stale_session(),
        }
    }

    /// Whether the session should be degraded after this failure.
    pub fn is_stale_session(&self) -> bool {
        match self {
            Self::SessionNotReady => true,
            Self::Tool(e) => e.is_stale_session(),
            _ => false,
        }
    }
}
