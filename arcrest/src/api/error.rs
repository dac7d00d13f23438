use thiserror::Error;

use super::common::RemoteError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Portal returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to parse response: {0}")]
    MalformedResponse(String),

    #[error("Authentication failed: {0}")]
    Auth(RemoteError),

    #[error("Request rejected: {0}")]
    Remote(RemoteError),

    #[error("Service creation rejected: {0}")]
    Provision(RemoteError),

    #[error("Layer mirroring failed: {message} (layers not mirrored: {unmirrored:?})")]
    Mirror {
        message: String,
        unmirrored: Vec<String>,
    },

    #[error("Feature edit rejected: {0}")]
    Mutation(RemoteError),

    #[error("JSON encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Network or HTTP-level failure, as opposed to a rejection carried in a response body.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Request(_) | ApiError::Http { .. })
    }

    /// True when the caller should re-authenticate before retrying.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    /// The portal's error object, when the failure carried one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            ApiError::Auth(e)
            | ApiError::Remote(e)
            | ApiError::Provision(e)
            | ApiError::Mutation(e) => Some(e),
            _ => None,
        }
    }
}
