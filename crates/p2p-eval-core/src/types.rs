//! Shared types used across p2p-eval crates.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Role a node plays in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Started first and advertised to later nodes as a static peer.
    Bootstrap,
    /// Started after every bootstrap address is known.
    Regular,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Bootstrap => "bootstrap",
            NodeRole::Regular => "regular",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to reach a running node from the host.
///
/// Handed out by the orchestrator; owns no container resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    /// Node identity, equal to its container name.
    pub name: String,
    pub role: NodeRole,
    /// Host the published ports are reachable on.
    pub host: String,
    /// Control-plane (REST) port.
    pub rest_port: u16,
    /// Metrics exposition port.
    pub metrics_port: u16,
}

impl NodeEndpoint {
    /// Base URL of the control-plane API, e.g. `http://127.0.0.1:8645`.
    pub fn rest_url(&self) -> String {
        format!("http://{}:{}", self.host, self.rest_port)
    }

    /// Full URL of the metrics endpoint.
    pub fn metrics_url(&self) -> String {
        format!("http://{}:{}/metrics", self.host, self.metrics_port)
    }
}

/// One counter reading from one node at one instant.
///
/// `value` is the cumulative counter as scraped, not a rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Wall-clock time of the reading, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub node_id: String,
    /// Label variant of the series (`in`, `out`, ...).
    pub direction: String,
    pub value: f64,
}

/// Retry budget for one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Fixed pause between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. A zero attempt count is raised to one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Budget for regular control-plane calls: 10 attempts, 1s apart.
    pub fn control_plane() -> Self {
        Self::new(10, Duration::from_secs(1))
    }

    /// Smaller budget for metrics scrapes so polling keeps its cadence.
    pub fn metrics() -> Self {
        Self::new(3, Duration::from_millis(500))
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::control_plane()
    }
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Nanoseconds since the Unix epoch.
pub fn epoch_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
