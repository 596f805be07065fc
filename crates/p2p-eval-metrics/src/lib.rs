//! p2p-eval-metrics: sampling cumulative counters from a running mesh.
//!
//! Parses the Prometheus text exposition served by each node, polls every
//! node concurrently on a fixed cadence, and reduces the resulting counter
//! readings to net bandwidth figures.
//!
//! # Architecture
//!
//! ```text
//! MetricsSampler::start() → SamplerHandle
//!   └── background task
//!       ├── per cycle: one task per node
//!       │   ├── MetricsSource::fetch_metrics()
//!       │   ├── scrape() → Vec<ScrapedValue>
//!       │   └── append MetricSample to the shared log
//!       └── wait one interval or the stop flag
//!
//! SamplerHandle::stop() → Vec<MetricSample>   (after join)
//! net_increase() / BandwidthSummary           (max - min per series)
//! ```

pub mod bandwidth;
pub mod exposition;
pub mod sampler;

pub use bandwidth::{BandwidthSummary, net_increase, total_net_bandwidth};
pub use exposition::{ScrapedValue, scrape};
pub use sampler::{MetricsSampler, MetricsSource, SamplerHandle};
