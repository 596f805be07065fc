//! Publish scenarios run against a live mesh.

use std::sync::Arc;

use anyhow::bail;
use p2p_eval_rpc::{RpcClient, WakuMessage};
use rand::Rng;
use tokio::task::JoinSet;
use tracing::{error, info};

pub const MESSAGES_CONTENT_TOPIC: &str = "num-vs-bw-content-topic";
pub const SIZE_CONTENT_TOPIC: &str = "size-vs-bw-content-topic";

/// Largest payload a node accepts on the relay API.
pub const MAX_PAYLOAD_BYTES: usize = 153_600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scenario {
    /// Every node publishes `per_node` messages, all at once.
    Messages { per_node: usize },
    /// A single node publishes `batch` messages of `size` bytes each.
    Size {
        size: usize,
        batch: usize,
        /// Index of the publishing node, taken modulo the node count.
        publisher: usize,
    },
}

impl Scenario {
    /// A `size` run whose publisher is drawn uniformly from `nodes`.
    pub fn size_with_random_publisher<R: Rng + ?Sized>(
        size: usize,
        batch: usize,
        nodes: usize,
        rng: &mut R,
    ) -> Self {
        Scenario::Size {
            size,
            batch,
            publisher: rng.gen_range(0..nodes.max(1)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Messages { .. } => "messages",
            Scenario::Size { .. } => "size",
        }
    }

    /// The swept variable of the scenario.
    pub fn param(&self) -> usize {
        match self {
            Scenario::Messages { per_node } => *per_node,
            Scenario::Size { size, .. } => *size,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            Scenario::Messages { .. } => Ok(()),
            Scenario::Size { size, batch, .. } => {
                if *size > MAX_PAYLOAD_BYTES {
                    bail!("payload size {size} exceeds the {MAX_PAYLOAD_BYTES} byte message limit");
                }
                if *batch == 0 {
                    bail!("batch must publish at least one message");
                }
                Ok(())
            }
        }
    }

    /// Messages published across the mesh in one run.
    pub fn total_messages(&self, nodes: usize) -> usize {
        match self {
            Scenario::Messages { per_node } => per_node * nodes,
            Scenario::Size { batch, .. } => *batch,
        }
    }

    /// Payload bytes published across the mesh in one run.
    pub fn total_payload_bytes(&self, node_ids: &[String]) -> usize {
        self.plan(node_ids)
            .iter()
            .filter_map(|(_, m)| m.payload_bytes())
            .map(|p| p.len())
            .sum()
    }

    /// `(node index, message)` for every publish of the run.
    pub fn plan(&self, node_ids: &[String]) -> Vec<(usize, WakuMessage)> {
        if node_ids.is_empty() {
            return Vec::new();
        }
        match self {
            Scenario::Messages { per_node } => node_ids
                .iter()
                .enumerate()
                .flat_map(|(node, id)| {
                    (0..*per_node).map(move |i| {
                        (node, WakuMessage::new(format!("msg-{i}-{id}"), MESSAGES_CONTENT_TOPIC))
                    })
                })
                .collect(),
            Scenario::Size {
                size,
                batch,
                publisher,
            } => {
                let node = publisher % node_ids.len();
                let payload = "a".repeat(*size);
                (0..*batch)
                    .map(|_| (node, WakuMessage::new(&payload, SIZE_CONTENT_TOPIC)))
                    .collect()
            }
        }
    }

    /// Publish the whole plan concurrently. Fails if any publish failed.
    pub async fn execute(
        &self,
        clients: &[(String, Arc<RpcClient>)],
        pubsub_topic: &str,
    ) -> anyhow::Result<usize> {
        let ids: Vec<String> = clients.iter().map(|(id, _)| id.clone()).collect();
        let plan = self.plan(&ids);
        info!(
            scenario = self.name(),
            param = self.param(),
            messages = plan.len(),
            "publishing"
        );

        let mut tasks = JoinSet::new();
        for (node, message) in plan {
            let (id, client) = &clients[node];
            let id = id.clone();
            let client = client.clone();
            let topic = pubsub_topic.to_string();
            tasks.spawn(async move {
                let result = client.publish(&topic, &message).await;
                (id, result)
            });
        }

        let mut published = 0;
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                (_, Ok(())) => published += 1,
                (node, Err(e)) => {
                    error!(node = %node, error = %e, "publish failed");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            bail!("{failed} of {} publishes failed", published + failed);
        }
        info!(published, "all messages published");
        Ok(published)
    }
}
