//! p2p-eval-rpc: HTTP client for a node's control plane.
//!
//! Wraps the relay REST API (`/info`, `/relay/v1/...`) and the separate
//! metrics port of one node. Every call goes through a fixed-delay retry
//! combinator, so callers can talk to a node that is still booting.
//!
//! # Architecture
//!
//! ```text
//! RpcClient
//!   ├── hyper-util pooled Client (one per RpcClient)
//!   ├── info / subscribe / publish / messages  ── retry: RetryPolicy
//!   └── metrics                                ── retry: smaller RetryPolicy
//!
//! with_retry(policy, operation, || attempt)
//!   └── RetryError { operation, attempts, source: last error }
//! ```

pub mod client;
pub mod error;
pub mod message;
pub mod retry;

pub use client::RpcClient;
pub use error::{RpcError, RpcResult};
pub use message::{NodeInfo, WakuMessage};
pub use retry::{RetryError, Retryable, with_retry};
