//! One experiment run: mesh up, traffic, metrics, mesh down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use p2p_eval_core::{EvalConfig, MetricSample, NodeEndpoint, RetryPolicy};
use p2p_eval_mesh::{ContainerEngine, Mesh, MeshSettings};
use p2p_eval_metrics::MetricsSampler;
use p2p_eval_rpc::RpcClient;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::scenario::Scenario;

/// Settle times between the phases of a run.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Until node REST APIs accept requests.
    pub api_wait: Duration,
    /// Until the gossip mesh has formed after subscribing.
    pub subscription_wait: Duration,
    /// Idle sampling before traffic starts.
    pub baseline_wait: Duration,
    /// Sampling after traffic, while messages propagate.
    pub post_action_wait: Duration,
}

pub struct RunOutcome {
    pub samples: Vec<MetricSample>,
    pub published: usize,
    pub node_ids: Vec<String>,
}

pub struct Experiment {
    pubsub_topic: String,
    metric: String,
    poll_interval: Duration,
    rpc_timeout: Duration,
    rpc_retry: RetryPolicy,
    metrics_retry: RetryPolicy,
    timing: Timing,
    mesh: MeshSettings,
    shutdown: watch::Receiver<bool>,
}

impl Experiment {
    /// `shutdown` flipping to `true` interrupts the current phase; the mesh
    /// is still torn down.
    pub fn new(config: &EvalConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            pubsub_topic: config.experiment.pubsub_topic.clone(),
            metric: config.sampler.metric.clone(),
            poll_interval: config.poll_interval()?,
            rpc_timeout: config.rpc_timeout()?,
            rpc_retry: config.rpc_retry()?,
            metrics_retry: config.metrics_retry()?,
            timing: Timing {
                api_wait: config.api_wait()?,
                subscription_wait: config.subscription_wait()?,
                baseline_wait: config.baseline_wait()?,
                post_action_wait: config.post_action_wait()?,
            },
            mesh: MeshSettings::from_config(config)?,
            shutdown,
        })
    }

    #[cfg(test)]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Run `scenario` on a fresh mesh.
    pub async fn run<E: ContainerEngine>(
        &self,
        engine: Arc<E>,
        scenario: &Scenario,
    ) -> anyhow::Result<RunOutcome> {
        scenario.validate()?;
        let mesh = Mesh::new(self.mesh.clone(), engine)?;
        mesh.run(|endpoints| self.drive(endpoints, scenario)).await
    }

    /// Everything between mesh start and mesh stop.
    pub async fn drive(
        &self,
        endpoints: Vec<NodeEndpoint>,
        scenario: &Scenario,
    ) -> anyhow::Result<RunOutcome> {
        let clients: Vec<(String, Arc<RpcClient>)> = endpoints
            .iter()
            .map(|e| (e.name.clone(), Arc::new(self.client_for(e))))
            .collect();

        let result = self.drive_with_clients(&clients, scenario).await;

        for (_, client) in clients {
            if let Ok(client) = Arc::try_unwrap(client) {
                client.close();
            }
        }
        result
    }

    fn client_for(&self, endpoint: &NodeEndpoint) -> RpcClient {
        RpcClient::for_endpoint(endpoint)
            .with_timeout(self.rpc_timeout)
            .with_retry_policy(self.rpc_retry)
            .with_metrics_retry_policy(self.metrics_retry)
    }

    async fn drive_with_clients(
        &self,
        clients: &[(String, Arc<RpcClient>)],
        scenario: &Scenario,
    ) -> anyhow::Result<RunOutcome> {
        self.pause("api_wait", self.timing.api_wait).await?;
        self.subscribe_all(clients).await?;
        self.pause("subscription_wait", self.timing.subscription_wait).await?;

        let mut sampler = MetricsSampler::new(&self.metric, self.poll_interval);
        for (id, client) in clients {
            sampler.add_node(id.clone(), client.clone());
        }
        let sampler = sampler.start();

        let traffic = async {
            self.pause("baseline_wait", self.timing.baseline_wait).await?;
            let published = tokio::select! {
                result = scenario.execute(clients, &self.pubsub_topic) => result?,
                _ = interrupted(self.shutdown.clone()) => bail!("interrupted while publishing"),
            };
            self.pause("post_action_wait", self.timing.post_action_wait).await?;
            Ok::<_, anyhow::Error>(published)
        }
        .await;

        info!("stopping metrics sampler");
        let samples = sampler.stop().await;
        let published = traffic?;

        info!(
            samples = samples.len(),
            published, "experiment run finished"
        );
        Ok(RunOutcome {
            samples,
            published,
            node_ids: clients.iter().map(|(id, _)| id.clone()).collect(),
        })
    }

    async fn subscribe_all(&self, clients: &[(String, Arc<RpcClient>)]) -> anyhow::Result<()> {
        info!(nodes = clients.len(), topic = %self.pubsub_topic, "subscribing all nodes");
        let topics = vec![self.pubsub_topic.clone()];
        let mut tasks = JoinSet::new();
        for (id, client) in clients {
            let id = id.clone();
            let client = client.clone();
            let topics = topics.clone();
            tasks.spawn(async move {
                let result = client.subscribe(&topics).await;
                (id, result)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let (id, result) = joined?;
            if let Err(e) = &result {
                error!(node = %id, error = %e, "subscribe failed");
            }
            result.with_context(|| format!("failed to subscribe {id}"))?;
        }
        Ok(())
    }

    async fn pause(&self, phase: &'static str, duration: Duration) -> anyhow::Result<()> {
        info!(phase, wait_ms = duration.as_millis() as u64, "waiting");
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = interrupted(self.shutdown.clone()) => bail!("interrupted during {phase}"),
        }
    }
}

/// Resolves once the flag is set. Never resolves if the sender is gone.
async fn interrupted(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        debug!("shutdown sender dropped");
        std::future::pending::<()>().await;
    }
}
