//! [`ContainerEngine`] backed by the `docker` command-line client.
//!
//! Every operation is one CLI invocation run through `tokio::process`. A
//! non-zero exit whose stderr says the object does not exist maps to
//! [`EngineError::NotFound`]; anything else is [`EngineError::CommandFailed`].

use tokio::process::Command;
use tracing::debug;

use crate::engine::{ContainerEngine, ContainerHandle, ContainerSpec};
use crate::error::{EngineError, EngineResult};

/// Overrides the client binary, e.g. `podman`.
pub const DOCKER_BINARY_ENV: &str = "P2P_EVAL_DOCKER";

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// `docker` on `$PATH`, or `$P2P_EVAL_DOCKER` when set.
    pub fn new() -> Self {
        let binary = std::env::var(DOCKER_BINARY_ENV).unwrap_or_else(|_| "docker".to_string());
        Self::with_binary(binary)
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run one command and return its trimmed stdout.
    async fn exec(&self, args: &[String]) -> EngineResult<String> {
        debug!(binary = %self.binary, args = ?args, "running container engine command");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_not_found(&stderr) {
            return Err(EngineError::NotFound(stderr));
        }
        Err(EngineError::CommandFailed {
            command: format!("{} {}", self.binary, args.join(" ")),
            status: output.status.to_string(),
            stderr,
        })
    }
}

fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no such container")
        || lower.contains("no such network")
        || (lower.contains("network") && lower.contains("not found"))
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// `run -d --name N --network NET -p P:P ... IMAGE ARGS...`
pub(crate) fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut out = args(&["run", "-d", "--name", &spec.name, "--network", &spec.network]);
    for port in &spec.ports {
        out.push("-p".to_string());
        out.push(format!("{port}:{port}"));
    }
    out.push(spec.image.clone());
    out.extend(spec.args.iter().cloned());
    out
}

impl ContainerEngine for DockerCli {
    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        self.exec(&args(&["pull", image])).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> EngineResult<bool> {
        match self.exec(&args(&["network", "rm", name])).await {
            Ok(_) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_network(&self, name: &str) -> EngineResult<()> {
        self.exec(&args(&["network", "create", "--driver", "bridge", name]))
            .await?;
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerHandle> {
        let id = self.exec(&run_args(spec)).await?;
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn stop_container(&self, container: &ContainerHandle) -> EngineResult<()> {
        self.exec(&args(&["stop", &container.id])).await?;
        Ok(())
    }

    async fn remove_container(&self, container: &ContainerHandle) -> EngineResult<()> {
        self.exec(&args(&["rm", &container.id])).await?;
        Ok(())
    }
}
