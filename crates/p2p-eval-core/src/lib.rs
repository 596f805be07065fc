//! p2p-eval-core: types shared by the mesh orchestrator, the RPC client,
//! and the metrics sampler.

pub mod config;
pub mod multiaddr;
pub mod types;

pub use config::{ConfigError, ConfigResult, EvalConfig, parse_duration};
pub use multiaddr::MultiAddress;
pub use types::*;
