//! Container engine capability interface.
//!
//! The orchestrator only needs a handful of operations: pull, network
//! create/remove, and container run/stop/remove. [`crate::DockerCli`] is the
//! production implementation; tests substitute an in-process fake.

use std::future::Future;

use crate::error::EngineResult;

/// What to run for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name, unique per engine.
    pub name: String,
    pub image: String,
    /// Command-line arguments passed to the image entrypoint.
    pub args: Vec<String>,
    /// TCP ports published 1:1 on the host.
    pub ports: Vec<u16>,
    /// Network to attach the container to.
    pub network: String,
}

/// A container created by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

pub trait ContainerEngine: Send + Sync + 'static {
    fn pull_image(&self, image: &str) -> impl Future<Output = EngineResult<()>> + Send;

    /// Remove a network. Returns `false` if it did not exist.
    fn remove_network(&self, name: &str) -> impl Future<Output = EngineResult<bool>> + Send;

    /// Create an isolated bridge network.
    fn create_network(&self, name: &str) -> impl Future<Output = EngineResult<()>> + Send;

    /// Create and start a detached container.
    fn run_container(
        &self,
        spec: &ContainerSpec,
    ) -> impl Future<Output = EngineResult<ContainerHandle>> + Send;

    fn stop_container(
        &self,
        container: &ContainerHandle,
    ) -> impl Future<Output = EngineResult<()>> + Send;

    fn remove_container(
        &self,
        container: &ContainerHandle,
    ) -> impl Future<Output = EngineResult<()>> + Send;
}
