//! `p2p-eval.toml` configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration for a 20-node nwaku mesh with one bootstrap node.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::RetryPolicy;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub mesh: MeshConfig,
    pub rpc: RpcConfig,
    pub discovery: RetryConfig,
    pub sampler: SamplerConfig,
    pub experiment: ExperimentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub num_nodes: usize,
    pub bootstrappers: usize,
    pub image: String,
    pub network: String,
    /// Host the published node ports are reachable on.
    pub host: String,
    /// Appended verbatim to every node's command line.
    pub extra_args: Vec<String>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            num_nodes: 20,
            bootstrappers: 1,
            image: "wakuorg/nwaku".to_string(),
            network: "p2p-eval-test".to_string(),
            host: "127.0.0.1".to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Per-call timeout.
    pub timeout: String,
    pub retry: RetryConfig,
    pub metrics_retry: RetryConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: "10s".to_string(),
            retry: RetryConfig::default(),
            metrics_retry: RetryConfig {
                attempts: 3,
                delay: "500ms".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: "1s".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self, field: &'static str) -> ConfigResult<RetryPolicy> {
        if self.attempts == 0 {
            return Err(ConfigError::Invalid(format!("{field}.attempts must be at least 1")));
        }
        Ok(RetryPolicy::new(self.attempts, duration_field(field, &self.delay)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Cumulative counter scraped from every node.
    pub metric: String,
    pub interval: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            metric: "libp2p_network_bytes_total".to_string(),
            interval: "1s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub pubsub_topic: String,
    /// Pause after mesh start before the REST API is used.
    pub api_wait: String,
    /// Pause after subscribing so the gossip mesh can form.
    pub subscription_wait: String,
    /// Sampling time before the scenario runs.
    pub baseline_wait: String,
    /// Sampling time after the scenario for messages to propagate.
    pub post_action_wait: String,
    pub results_dir: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            pubsub_topic: "/waku/2/default-waku/proto".to_string(),
            api_wait: "10s".to_string(),
            subscription_wait: "10s".to_string(),
            baseline_wait: "15s".to_string(),
            post_action_wait: "10s".to_string(),
            results_dir: "results".to_string(),
        }
    }
}

impl EvalConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: EvalConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field invariants and that every duration parses.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.mesh.bootstrappers >= self.mesh.num_nodes {
            return Err(ConfigError::Invalid(format!(
                "mesh.bootstrappers ({}) must be smaller than mesh.num_nodes ({})",
                self.mesh.bootstrappers, self.mesh.num_nodes
            )));
        }
        self.rpc_timeout()?;
        self.rpc_retry()?;
        self.metrics_retry()?;
        self.discovery_retry()?;
        if self.poll_interval()?.is_zero() {
            return Err(ConfigError::Invalid("sampler.interval must be non-zero".to_string()));
        }
        self.api_wait()?;
        self.subscription_wait()?;
        self.baseline_wait()?;
        self.post_action_wait()?;
        Ok(())
    }

    pub fn rpc_timeout(&self) -> ConfigResult<Duration> {
        duration_field("rpc.timeout", &self.rpc.timeout)
    }

    pub fn rpc_retry(&self) -> ConfigResult<RetryPolicy> {
        self.rpc.retry.policy("rpc.retry")
    }

    pub fn metrics_retry(&self) -> ConfigResult<RetryPolicy> {
        self.rpc.metrics_retry.policy("rpc.metrics_retry")
    }

    pub fn discovery_retry(&self) -> ConfigResult<RetryPolicy> {
        self.discovery.policy("discovery")
    }

    pub fn poll_interval(&self) -> ConfigResult<Duration> {
        duration_field("sampler.interval", &self.sampler.interval)
    }

    pub fn api_wait(&self) -> ConfigResult<Duration> {
        duration_field("experiment.api_wait", &self.experiment.api_wait)
    }

    pub fn subscription_wait(&self) -> ConfigResult<Duration> {
        duration_field("experiment.subscription_wait", &self.experiment.subscription_wait)
    }

    pub fn baseline_wait(&self) -> ConfigResult<Duration> {
        duration_field("experiment.baseline_wait", &self.experiment.baseline_wait)
    }

    pub fn post_action_wait(&self) -> ConfigResult<Duration> {
        duration_field("experiment.post_action_wait", &self.experiment.post_action_wait)
    }
}

fn duration_field(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = mins.trim().parse::<u64>().ok()?;
        mins.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
