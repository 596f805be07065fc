//! Mesh orchestrator.
//!
//! Owns every container and the network it creates. Start order is strict:
//! bootstrap nodes, then their multi-addresses, then regular nodes pointed at
//! those addresses. Teardown is best-effort and never fails.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use p2p_eval_core::{ConfigResult, EvalConfig, MultiAddress, NodeEndpoint, NodeRole, RetryPolicy};
use p2p_eval_rpc::{RpcClient, with_retry};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::engine::{ContainerEngine, ContainerHandle, ContainerSpec};
use crate::error::{EngineError, MeshError, MeshResult, ResolveError};
use crate::node::{MeshNode, NodeArgs, node_name};
use crate::ports::allocate_ports;

/// Everything the orchestrator needs to know about the mesh it builds.
#[derive(Debug, Clone)]
pub struct MeshSettings {
    pub num_nodes: usize,
    pub bootstrappers: usize,
    pub image: String,
    pub network: String,
    /// Host on which published node ports are reachable.
    pub host: String,
    /// Appended to every node's command line.
    pub extra_args: Vec<String>,
    /// Budget for resolving one bootstrap node's address.
    pub discovery_retry: RetryPolicy,
    pub rpc_timeout: Duration,
}

impl MeshSettings {
    pub fn new(num_nodes: usize, bootstrappers: usize) -> Self {
        Self {
            num_nodes,
            bootstrappers,
            image: "wakuorg/nwaku".to_string(),
            network: "p2p-eval-test".to_string(),
            host: "127.0.0.1".to_string(),
            extra_args: Vec::new(),
            discovery_retry: RetryPolicy::control_plane(),
            rpc_timeout: p2p_eval_rpc::client::DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &EvalConfig) -> ConfigResult<Self> {
        Ok(Self {
            num_nodes: config.mesh.num_nodes,
            bootstrappers: config.mesh.bootstrappers,
            image: config.mesh.image.clone(),
            network: config.mesh.network.clone(),
            host: config.mesh.host.clone(),
            extra_args: config.mesh.extra_args.clone(),
            discovery_retry: config.discovery_retry()?,
            rpc_timeout: config.rpc_timeout()?,
        })
    }

    pub fn regular_nodes(&self) -> usize {
        self.num_nodes - self.bootstrappers
    }
}

pub struct Mesh<E: ContainerEngine> {
    settings: MeshSettings,
    engine: Arc<E>,
    /// Set once the network has been created by this mesh.
    network: Option<String>,
    bootstrap_nodes: Vec<MeshNode>,
    nodes: Vec<MeshNode>,
    /// Containers whose run failed. The engine may still have created them.
    failed: Vec<ContainerHandle>,
}

impl<E: ContainerEngine> Mesh<E> {
    /// Fails unless `bootstrappers < num_nodes`.
    pub fn new(settings: MeshSettings, engine: Arc<E>) -> MeshResult<Self> {
        if settings.bootstrappers >= settings.num_nodes {
            return Err(MeshError::Config(format!(
                "bootstrappers ({}) must be smaller than num_nodes ({})",
                settings.bootstrappers, settings.num_nodes
            )));
        }
        Ok(Self {
            settings,
            engine,
            network: None,
            bootstrap_nodes: Vec::new(),
            nodes: Vec::new(),
            failed: Vec::new(),
        })
    }

    pub fn settings(&self) -> &MeshSettings {
        &self.settings
    }

    pub fn bootstrap_nodes(&self) -> &[MeshNode] {
        &self.bootstrap_nodes
    }

    pub fn regular_nodes(&self) -> &[MeshNode] {
        &self.nodes
    }

    /// Whether this mesh still owns any container or the network.
    pub fn is_running(&self) -> bool {
        self.network.is_some()
            || !self.bootstrap_nodes.is_empty()
            || !self.nodes.is_empty()
            || !self.failed.is_empty()
    }

    /// Bootstrap nodes first, then regular nodes, each in creation order.
    pub fn endpoints(&self) -> Vec<NodeEndpoint> {
        self.bootstrap_nodes
            .iter()
            .chain(&self.nodes)
            .map(|n| n.endpoint(&self.settings.host))
            .collect()
    }

    /// Provision the whole mesh.
    ///
    /// Containers created before a failure stay owned by the mesh, so a
    /// following [`Mesh::stop`] removes them.
    pub async fn start(&mut self) -> MeshResult<()> {
        if self.is_running() {
            return Err(MeshError::AlreadyStarted);
        }
        let settings = self.settings.clone();
        info!(
            nodes = settings.num_nodes,
            bootstrappers = settings.bootstrappers,
            image = %settings.image,
            network = %settings.network,
            "starting mesh"
        );

        self.engine
            .pull_image(&settings.image)
            .await
            .map_err(|source| MeshError::Image {
                image: settings.image.clone(),
                source,
            })?;
        self.prepare_network().await?;

        let ports = allocate_ports(2 * settings.num_nodes).map_err(MeshError::Ports)?;
        let (bootstrap_ports, regular_ports) = ports.split_at(2 * settings.bootstrappers);

        self.launch(NodeRole::Bootstrap, bootstrap_ports, &[]).await?;
        let peers = self.resolve_bootstrap_addresses().await?;
        self.launch(NodeRole::Regular, regular_ports, &peers).await?;

        info!(
            bootstrap = self.bootstrap_nodes.len(),
            regular = self.nodes.len(),
            "mesh started"
        );
        Ok(())
    }

    /// Remove a stale network of the same name, then create a fresh one.
    async fn prepare_network(&mut self) -> MeshResult<()> {
        let name = self.settings.network.clone();
        let network_err = |source: EngineError| MeshError::Network {
            network: name.clone(),
            source,
        };

        if self.engine.remove_network(&name).await.map_err(network_err)? {
            info!(network = %name, "removed stale network");
        }
        self.engine.create_network(&name).await.map_err(network_err)?;
        debug!(network = %name, "network created");
        self.network = Some(name);
        Ok(())
    }

    /// Start one container per port pair, concurrently.
    ///
    /// Every container that did start is recorded before the first error,
    /// if any, is returned. A failed run is recorded by name, since the
    /// engine can create a container and then fail to start it.
    async fn launch(
        &mut self,
        role: NodeRole,
        ports: &[u16],
        static_nodes: &[MultiAddress],
    ) -> MeshResult<()> {
        let mut tasks = JoinSet::new();
        for (index, pair) in ports.chunks_exact(2).enumerate() {
            let (rest_port, metrics_port) = (pair[0], pair[1]);
            let name = node_name(role, index);
            let spec = ContainerSpec {
                name: name.clone(),
                image: self.settings.image.clone(),
                args: NodeArgs::new(rest_port, metrics_port)
                    .with_static_nodes(static_nodes)
                    .with_extra(&self.settings.extra_args)
                    .to_args(),
                ports: vec![rest_port, metrics_port],
                network: self.settings.network.clone(),
            };
            let engine = self.engine.clone();
            tasks.spawn(async move {
                let result = engine.run_container(&spec).await;
                (index, spec, result)
            });
        }

        let mut started = Vec::new();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, spec, Ok(container))) => {
                    info!(node = %spec.name, role = %role, id = %container.id, "node started");
                    started.push((
                        index,
                        MeshNode {
                            name: spec.name,
                            role,
                            container,
                            rest_port: spec.ports[0],
                            metrics_port: spec.ports[1],
                        },
                    ));
                }
                Ok((_, spec, Err(source))) => {
                    error!(node = %spec.name, error = %source, "node failed to start");
                    self.failed.push(ContainerHandle {
                        id: spec.name.clone(),
                        name: spec.name.clone(),
                    });
                    first_error.get_or_insert(MeshError::NodeStart {
                        node: spec.name,
                        source,
                    });
                }
                Err(e) => {
                    error!(error = %e, "node start task failed");
                    first_error.get_or_insert(MeshError::Task(e));
                }
            }
        }

        started.sort_by_key(|(index, _)| *index);
        let target = match role {
            NodeRole::Bootstrap => &mut self.bootstrap_nodes,
            NodeRole::Regular => &mut self.nodes,
        };
        target.extend(started.into_iter().map(|(_, node)| node));

        first_error.map_or(Ok(()), Err)
    }

    /// Query every bootstrap node for a dialable address, concurrently.
    async fn resolve_bootstrap_addresses(&self) -> MeshResult<Vec<MultiAddress>> {
        let mut tasks = JoinSet::new();
        for (index, node) in self.bootstrap_nodes.iter().enumerate() {
            let name = node.name.clone();
            let client = RpcClient::new(&self.settings.host, node.rest_port, node.metrics_port)
                .with_timeout(self.settings.rpc_timeout);
            let policy = self.settings.discovery_retry;
            tasks.spawn(async move {
                let client = &client;
                let result = with_retry(policy, "resolve_multiaddr", || async move {
                    let info = client.try_info().await?;
                    info.routable_address()
                        .ok_or(ResolveError::NoRoutableAddress {
                            advertised: info.listen_addresses,
                        })
                })
                .await;
                (index, name, result)
            });
        }

        let mut resolved = vec![None; self.bootstrap_nodes.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, node, result) = joined?;
            let address = result.map_err(|source| MeshError::AddressResolution {
                node: node.clone(),
                source,
            })?;
            info!(node = %node, %address, "resolved bootstrap address");
            resolved[index] = Some(address);
        }
        Ok(resolved.into_iter().flatten().collect())
    }

    /// Stop and remove every owned container, then the network.
    ///
    /// Per-container failures are logged and skipped. Safe after a partial
    /// start and safe to call twice.
    pub async fn stop(&mut self) {
        if !self.is_running() {
            debug!("mesh already stopped");
            return;
        }
        info!(
            containers = self.bootstrap_nodes.len() + self.nodes.len(),
            failed = self.failed.len(),
            "stopping mesh"
        );

        let containers = self
            .bootstrap_nodes
            .iter()
            .chain(&self.nodes)
            .map(|n| n.container.clone())
            .chain(self.failed.iter().cloned());
        let mut tasks = JoinSet::new();
        for container in containers {
            let engine = self.engine.clone();
            tasks.spawn(async move { teardown_container(engine.as_ref(), &container).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "node teardown task failed");
            }
        }

        if let Some(network) = &self.network {
            match self.engine.remove_network(network).await {
                Ok(true) => info!(network = %network, "network removed"),
                Ok(false) => warn!(network = %network, "network already gone"),
                Err(e) => error!(network = %network, error = %e, "failed to remove network"),
            }
        }

        self.bootstrap_nodes.clear();
        self.nodes.clear();
        self.failed.clear();
        self.network = None;
        info!("mesh stopped");
    }

    /// Start the mesh, run `body` against its endpoints, and stop it on every
    /// exit path. A panic in `body` is resumed after teardown.
    pub async fn run<T, F, Fut>(mut self, body: F) -> anyhow::Result<T>
    where
        F: FnOnce(Vec<NodeEndpoint>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Err(e) = self.start().await {
            error!(error = %e, "mesh start failed, tearing down");
            self.stop().await;
            return Err(e.into());
        }

        let endpoints = self.endpoints();
        let outcome = AssertUnwindSafe(async move { body(endpoints).await })
            .catch_unwind()
            .await;
        self.stop().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

async fn teardown_container<E: ContainerEngine>(engine: &E, container: &ContainerHandle) {
    let node = &container.name;
    match engine.stop_container(container).await {
        Ok(()) => debug!(%node, "container stopped"),
        Err(EngineError::NotFound(_)) => {
            warn!(%node, "container already removed");
            return;
        }
        Err(e) => error!(%node, error = %e, "failed to stop container"),
    }
    match engine.remove_container(container).await {
        Ok(()) => info!(%node, "container removed"),
        Err(EngineError::NotFound(_)) => warn!(%node, "container already removed"),
        Err(e) => error!(%node, error = %e, "failed to remove container"),
    }
}

impl<E: ContainerEngine> Drop for Mesh<E> {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(
                containers = self.bootstrap_nodes.len() + self.nodes.len() + self.failed.len(),
                network = ?self.network,
                "mesh dropped without stop, resources may be left behind"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_default_config() {
        let settings = MeshSettings::from_config(&EvalConfig::default()).unwrap();
        assert_eq!(settings.num_nodes, 20);
        assert_eq!(settings.bootstrappers, 1);
        assert_eq!(settings.regular_nodes(), 19);
        assert_eq!(settings.discovery_retry, RetryPolicy::control_plane());
        assert_eq!(settings.rpc_timeout, Duration::from_secs(10));
    }
}
