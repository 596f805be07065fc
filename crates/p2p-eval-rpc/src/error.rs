//! RPC error types.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::retry::{RetryError, Retryable};

/// Result of a retried client operation.
pub type RpcResult<T> = Result<T, RetryError<RpcError>>;

/// Failure of a single request attempt.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connection to {uri} failed: {source}")]
    Transport {
        uri: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("request to {uri} timed out after {timeout:?}")]
    Timeout { uri: String, timeout: Duration },

    #[error("HTTP {status} from {uri}: {body}")]
    Status {
        uri: String,
        status: StatusCode,
        body: String,
    },

    #[error("failed to read response body from {uri}: {source}")]
    Body {
        uri: String,
        #[source]
        source: hyper::Error,
    },

    #[error("invalid JSON in response from {uri}: {source}")]
    Decode {
        uri: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),
}

impl RpcError {
    /// Whether the failure happened before any response arrived.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, RpcError::Transport { .. } | RpcError::Timeout { .. })
    }
}

impl Retryable for RpcError {
    /// Everything except locally malformed requests is retried, including
    /// non-2xx responses.
    // TODO: stop retrying 4xx responses once the nodes' startup window is
    // covered by address discovery alone.
    fn is_retryable(&self) -> bool {
        !matches!(self, RpcError::Encode(_) | RpcError::Request(_))
    }
}
