//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The session could not be established.
    #[error(transparent)]
    Init(#[from] runtime::InitError),

    /// Establishment failed; carries the reported reason.
    #[error("initialization failed: {0}")]
    NotInitialized(String),

    #[error(transparent)]
    Query(#[from] runtime::QueryError),

    #[error(transparent)]
    Rebuild(#[from] runtime::RebuildError),

    /// `tiller rebuild` without `server.rebuild_command`.
    #[error("no rebuild command configured: set server.rebuild_command in {config}")]
    NoRebuildCommand { config: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
