//! Metrics sampler: background task that polls every node on a cadence.
//!
//! Each cycle fans out one scrape per node so all nodes are read at roughly
//! the same instant. Samples are appended to a shared log behind a mutex; the
//! log is only handed back by [`SamplerHandle::stop`], after the task has been
//! joined.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use p2p_eval_core::{MetricSample, epoch_millis};
use p2p_eval_rpc::RpcClient;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::exposition::scrape;

/// Anything that can produce a node's exposition text.
pub trait MetricsSource: Send + Sync + 'static {
    fn fetch_metrics(&self) -> impl Future<Output = anyhow::Result<String>> + Send;
}

impl MetricsSource for RpcClient {
    async fn fetch_metrics(&self) -> anyhow::Result<String> {
        Ok(self.metrics().await?)
    }
}

type SampleLog = Arc<Mutex<Vec<MetricSample>>>;

/// Polls one cumulative counter across a set of nodes.
pub struct MetricsSampler<S> {
    nodes: Vec<(String, Arc<S>)>,
    metric: Arc<str>,
    interval: Duration,
}

impl<S: MetricsSource> MetricsSampler<S> {
    pub fn new(metric: &str, interval: Duration) -> Self {
        Self {
            nodes: Vec::new(),
            metric: Arc::from(metric),
            interval,
        }
    }

    /// Add a node to poll. `node_id` is recorded on every sample.
    pub fn add_node(&mut self, node_id: impl Into<String>, source: Arc<S>) {
        self.nodes.push((node_id.into(), source));
    }

    pub fn with_node(mut self, node_id: impl Into<String>, source: Arc<S>) -> Self {
        self.add_node(node_id, source);
        self
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Spawn the polling task.
    pub fn start(self) -> SamplerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let log: SampleLog = Arc::new(Mutex::new(Vec::new()));
        let task_log = log.clone();
        let handle = tokio::spawn(async move {
            self.run(task_log, shutdown_rx).await;
        });
        SamplerHandle {
            shutdown_tx,
            handle,
            log,
        }
    }

    async fn run(self, log: SampleLog, mut shutdown: watch::Receiver<bool>) {
        info!(
            nodes = self.nodes.len(),
            metric = %self.metric,
            interval_ms = self.interval.as_millis() as u64,
            "metrics sampler started"
        );

        let mut cycles: u64 = 0;
        while !*shutdown.borrow() {
            let appended = self.cycle(&log).await;
            cycles += 1;
            debug!(cycle = cycles, appended, "sampling cycle complete");

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(cycles, "metrics sampler stopped");
    }

    /// Scrape every node once, concurrently. Returns the number of samples
    /// appended; a failing node contributes nothing this cycle.
    async fn cycle(&self, log: &SampleLog) -> usize {
        let mut tasks = JoinSet::new();
        for (node_id, source) in &self.nodes {
            let node_id = node_id.clone();
            let source = source.clone();
            let metric = self.metric.clone();
            let log = log.clone();
            tasks.spawn(async move {
                let result = sample_node(&node_id, source.as_ref(), &metric, &log).await;
                (node_id, result)
            });
        }

        let mut appended = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(n))) => appended += n,
                Ok((node_id, Err(e))) => {
                    warn!(node = %node_id, error = %e, "metrics poll failed, skipping node this cycle");
                }
                Err(e) => error!(error = %e, "metrics poll task panicked"),
            }
        }
        appended
    }
}

async fn sample_node<S: MetricsSource>(
    node_id: &str,
    source: &S,
    metric: &str,
    log: &SampleLog,
) -> anyhow::Result<usize> {
    let text = source.fetch_metrics().await?;
    let timestamp_ms = epoch_millis();
    let samples: Vec<MetricSample> = scrape(&text, metric)
        .into_iter()
        .map(|scraped| MetricSample {
            timestamp_ms,
            node_id: node_id.to_string(),
            direction: series_key(&scraped.labels),
            value: scraped.value,
        })
        .collect();

    let n = samples.len();
    if n == 0 {
        debug!(node = %node_id, %metric, "metric not present in scrape");
    }
    log.lock().await.extend(samples);
    Ok(n)
}

/// The `direction` label, or the rendered label set for other series.
fn series_key(labels: &BTreeMap<String, String>) -> String {
    if let Some(direction) = labels.get("direction") {
        return direction.clone();
    }
    if labels.is_empty() {
        return "total".to_string();
    }
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Owner's side of a running sampler.
pub struct SamplerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    log: SampleLog,
}

impl SamplerHandle {
    /// Whether the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task, wait for it to exit, and take the collected samples.
    ///
    /// The flag stays set, so a task between cycles observes it on its next
    /// check. No cycle starts after the signal.
    pub async fn stop(self) -> Vec<MetricSample> {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "metrics sampler task failed");
        }
        let mut log = self.log.lock().await;
        let samples = std::mem::take(&mut *log);
        info!(samples = samples.len(), "metrics sampler joined");
        samples
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    const METRIC: &str = "libp2p_network_bytes_total";

    /// Counter that grows by 100 bytes inbound and 50 outbound per scrape.
    #[derive(Default)]
    struct FakeSource {
        calls: AtomicU64,
        fail: bool,
        delay: Duration,
    }

    impl FakeSource {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MetricsSource for FakeSource {
        async fn fetch_metrics(&self) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(format!(
                "# TYPE libp2p_network_bytes_total counter\n\
                 libp2p_network_bytes_total{{direction=\"in\"}} {}\n\
                 libp2p_network_bytes_total{{direction=\"out\"}} {}\n",
                n * 100,
                n * 50
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn collects_both_directions_per_cycle() {
        let source = Arc::new(FakeSource::default());
        let sampler = MetricsSampler::new(METRIC, Duration::from_secs(1))
            .with_node("node-0", source.clone());

        let handle = sampler.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let samples = handle.stop().await;

        let cycles = source.calls() as usize;
        assert!(cycles >= 2, "expected at least two cycles, got {cycles}");
        assert_eq!(samples.len(), cycles * 2);
        assert!(samples.iter().all(|s| s.node_id == "node-0"));

        let inbound: Vec<f64> = samples
            .iter()
            .filter(|s| s.direction == "in")
            .map(|s| s.value)
            .collect();
        assert_eq!(inbound.len(), cycles);
        assert!(inbound.windows(2).all(|w| w[0] <= w[1]), "per-node order");
    }

    #[tokio::test(start_paused = true)]
    async fn failing_node_is_skipped_not_fatal() {
        let good = Arc::new(FakeSource::default());
        let bad = Arc::new(FakeSource::failing());
        let sampler = MetricsSampler::new(METRIC, Duration::from_secs(1))
            .with_node("node-0", good.clone())
            .with_node("node-1", bad.clone());

        let handle = sampler.start();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let samples = handle.stop().await;

        // The failing node was polled every cycle, yet never contributed.
        assert_eq!(bad.calls(), good.calls());
        assert!(good.calls() >= 2);
        assert_eq!(samples.len() as u64, good.calls() * 2);
        assert!(samples.iter().all(|s| s.node_id == "node-0"));
    }

    #[tokio::test(start_paused = true)]
    async fn one_cycle_samples_every_node() {
        let log: SampleLog = Arc::new(Mutex::new(Vec::new()));
        let sampler = MetricsSampler::new(METRIC, Duration::from_secs(1))
            .with_node("node-0", Arc::new(FakeSource::default()))
            .with_node("node-1", Arc::new(FakeSource::failing()))
            .with_node("node-2", Arc::new(FakeSource::default()));

        let appended = sampler.cycle(&log).await;
        assert_eq!(appended, 4);
        let log = log.lock().await;
        assert_eq!(log.iter().filter(|s| s.node_id == "node-0").count(), 2);
        assert_eq!(log.iter().filter(|s| s.node_id == "node-1").count(), 0);
        assert_eq!(log.iter().filter(|s| s.node_id == "node-2").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_latency_is_bounded() {
        let fetch = Duration::from_millis(300);
        let interval = Duration::from_secs(1);
        let sampler = MetricsSampler::new(METRIC, interval)
            .with_node("node-0", Arc::new(FakeSource::slow(fetch)));

        let handle = sampler.start();
        // Land in the middle of the second fetch.
        tokio::time::sleep(Duration::from_millis(1450)).await;

        let stop_at = tokio::time::Instant::now();
        let samples = handle.stop().await;
        assert!(stop_at.elapsed() <= interval + fetch);
        assert_eq!(samples.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn no_scrapes_after_join() {
        let source = Arc::new(FakeSource::default());
        let sampler = MetricsSampler::new(METRIC, Duration::from_millis(200))
            .with_node("node-0", source.clone());

        let handle = sampler.start();
        tokio::time::sleep(Duration::from_millis(700)).await;
        let samples = handle.stop().await;
        let calls_at_stop = source.calls();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls(), calls_at_stop);
        assert_eq!(samples.len() as u64, calls_at_stop * 2);
    }

    #[tokio::test]
    async fn stop_before_first_tick_still_joins() {
        let sampler = MetricsSampler::new(METRIC, Duration::from_secs(60))
            .with_node("node-0", Arc::new(FakeSource::default()));
        let handle = sampler.start();
        let samples = handle.stop().await;
        // Zero or one cycle ran; never more.
        assert!(samples.len() <= 2);
    }

    #[test]
    fn series_key_prefers_direction() {
        let mut labels = BTreeMap::new();
        assert_eq!(series_key(&labels), "total");
        labels.insert("peer".to_string(), "a".to_string());
        labels.insert("kind".to_string(), "b".to_string());
        assert_eq!(series_key(&labels), "kind=b,peer=a");
        labels.insert("direction".to_string(), "in".to_string());
        assert_eq!(series_key(&labels), "in");
    }
}
