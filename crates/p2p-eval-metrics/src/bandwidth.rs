//! Net bandwidth from cumulative counter samples.
//!
//! A cumulative counter only grows, so the bytes moved during a sampling
//! window are `max - min` of each node's series.

use std::collections::BTreeMap;

use p2p_eval_core::MetricSample;
use serde::{Deserialize, Serialize};

/// Increase of every `(node, direction)` series over the window.
///
/// A series with a single sample contributes 0.
pub fn net_increase(samples: &[MetricSample]) -> BTreeMap<(String, String), f64> {
    let mut ranges: BTreeMap<(String, String), (f64, f64)> = BTreeMap::new();
    for s in samples {
        ranges
            .entry((s.node_id.clone(), s.direction.clone()))
            .and_modify(|(min, max)| {
                *min = min.min(s.value);
                *max = max.max(s.value);
            })
            .or_insert((s.value, s.value));
    }
    ranges
        .into_iter()
        .map(|(key, (min, max))| (key, max - min))
        .collect()
}

/// Sum of all per-series increases.
pub fn total_net_bandwidth(samples: &[MetricSample]) -> f64 {
    net_increase(samples).values().sum()
}

/// Aggregate of one experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSummary {
    /// Free-form run label, e.g. `messages-16`.
    pub run: String,
    pub nodes: usize,
    pub samples: usize,
    /// Net bytes per direction, summed over nodes.
    pub by_direction: BTreeMap<String, f64>,
    /// Net bytes over all nodes and directions.
    pub total_bytes: f64,
}

impl BandwidthSummary {
    pub fn from_samples(run: impl Into<String>, samples: &[MetricSample]) -> Self {
        let increases = net_increase(samples);
        let mut by_direction: BTreeMap<String, f64> = BTreeMap::new();
        let mut nodes = std::collections::BTreeSet::new();
        for ((node, direction), bytes) in &increases {
            nodes.insert(node.as_str());
            *by_direction.entry(direction.clone()).or_default() += bytes;
        }
        Self {
            run: run.into(),
            nodes: nodes.len(),
            samples: samples.len(),
            total_bytes: increases.values().sum(),
            by_direction,
        }
    }

    pub fn total_megabytes(&self) -> f64 {
        self.total_bytes / (1024.0 * 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: u64, node: &str, direction: &str, value: f64) -> MetricSample {
        MetricSample {
            timestamp_ms: t,
            node_id: node.to_string(),
            direction: direction.to_string(),
            value,
        }
    }

    #[test]
    fn single_sample_is_zero() {
        let samples = vec![sample(0, "node-0", "in", 5055.0)];
        assert_eq!(total_net_bandwidth(&samples), 0.0);
    }

    #[test]
    fn monotonic_series_equals_true_increase() {
        // Increments of 10, 0, 250, 3: true increase is 263.
        let values = [100.0, 110.0, 110.0, 360.0, 363.0];
        let samples: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| sample(i as u64 * 1000, "node-0", "in", *v))
            .collect();
        assert_eq!(total_net_bandwidth(&samples), 263.0);
    }

    #[test]
    fn directions_are_separate_series() {
        // Mixing in/out in one series would yield 900 - 50.
        let samples = vec![
            sample(0, "node-0", "in", 800.0),
            sample(0, "node-0", "out", 50.0),
            sample(1, "node-0", "in", 900.0),
            sample(1, "node-0", "out", 70.0),
        ];
        let inc = net_increase(&samples);
        assert_eq!(inc[&("node-0".to_string(), "in".to_string())], 100.0);
        assert_eq!(inc[&("node-0".to_string(), "out".to_string())], 20.0);
        assert_eq!(total_net_bandwidth(&samples), 120.0);
    }

    #[test]
    fn order_of_samples_does_not_matter() {
        let mut samples = vec![
            sample(2, "node-1", "in", 30.0),
            sample(0, "node-1", "in", 10.0),
            sample(1, "node-0", "in", 7.0),
            sample(0, "node-0", "in", 5.0),
        ];
        let forward = total_net_bandwidth(&samples);
        samples.reverse();
        assert_eq!(forward, 22.0);
        assert_eq!(total_net_bandwidth(&samples), forward);
    }

    #[test]
    fn summary_groups_by_direction() {
        let samples = vec![
            sample(0, "node-0", "in", 0.0),
            sample(1, "node-0", "in", 1024.0 * 1024.0),
            sample(0, "node-1", "in", 0.0),
            sample(1, "node-1", "in", 1024.0 * 1024.0),
            sample(0, "node-1", "out", 10.0),
            sample(1, "node-1", "out", 20.0),
        ];
        let summary = BandwidthSummary::from_samples("messages-4", &samples);
        assert_eq!(summary.nodes, 2);
        assert_eq!(summary.samples, 6);
        assert_eq!(summary.by_direction["in"], 2.0 * 1024.0 * 1024.0);
        assert_eq!(summary.by_direction["out"], 10.0);
        assert!((summary.total_megabytes() - 2.0).abs() < 0.001);
    }

    #[test]
    fn empty_summary() {
        let summary = BandwidthSummary::from_samples("empty", &[]);
        assert_eq!(summary.nodes, 0);
        assert_eq!(summary.total_bytes, 0.0);
        assert!(summary.by_direction.is_empty());
    }
}
