use thiserror::Error;

/// Errors from model gateway calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The request never reached the provider, or the connection dropped.
    #[error("network: {0}")]
    Network(String),

    /// The provider did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The provider rejected the credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The provider returned an error response.
    #[error("provider api: {0}")]
    Api(String),

    /// The provider response could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}
