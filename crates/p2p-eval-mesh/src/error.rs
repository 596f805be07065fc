//! Mesh error types.

use p2p_eval_rpc::{RetryError, Retryable, RpcError};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by a container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to run container engine: {0}")]
    Io(#[from] std::io::Error),
}

pub type MeshResult<T> = Result<T, MeshError>;

/// Errors that abort mesh construction or start.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("invalid mesh configuration: {0}")]
    Config(String),

    #[error("mesh is already started")]
    AlreadyStarted,

    #[error("failed to pull image {image}: {source}")]
    Image {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to prepare network {network}: {source}")]
    Network {
        network: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to allocate host ports: {0}")]
    Ports(#[source] std::io::Error),

    #[error("failed to start node {node}: {source}")]
    NodeStart {
        node: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to resolve multi-address of {node}: {source}")]
    AddressResolution {
        node: String,
        #[source]
        source: RetryError<ResolveError>,
    },

    #[error("mesh task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One failed attempt at resolving a bootstrap node's multi-address.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("no non-loopback address advertised (got {advertised:?})")]
    NoRoutableAddress { advertised: Vec<String> },
}

impl Retryable for ResolveError {
    fn is_retryable(&self) -> bool {
        match self {
            ResolveError::Rpc(e) => e.is_retryable(),
            // The node may not have bound its container interface yet.
            ResolveError::NoRoutableAddress { .. } => true,
        }
    }
}
