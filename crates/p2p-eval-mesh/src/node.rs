//! Node containers and their command line.

use p2p_eval_core::{MultiAddress, NodeEndpoint, NodeRole};

use crate::engine::ContainerHandle;

/// A running node owned by the mesh.
#[derive(Debug, Clone)]
pub struct MeshNode {
    pub name: String,
    pub role: NodeRole,
    pub container: ContainerHandle,
    pub rest_port: u16,
    pub metrics_port: u16,
}

impl MeshNode {
    pub fn endpoint(&self, host: &str) -> NodeEndpoint {
        NodeEndpoint {
            name: self.name.clone(),
            role: self.role,
            host: host.to_string(),
            rest_port: self.rest_port,
            metrics_port: self.metrics_port,
        }
    }
}

/// nwaku command-line flags for one node.
#[derive(Debug, Clone, Default)]
pub struct NodeArgs {
    pub rest_port: u16,
    pub metrics_port: u16,
    pub static_nodes: Vec<MultiAddress>,
    pub extra: Vec<String>,
}

impl NodeArgs {
    pub fn new(rest_port: u16, metrics_port: u16) -> Self {
        Self {
            rest_port,
            metrics_port,
            ..Default::default()
        }
    }

    pub fn with_static_nodes(mut self, peers: &[MultiAddress]) -> Self {
        self.static_nodes = peers.to_vec();
        self
    }

    pub fn with_extra(mut self, extra: &[String]) -> Self {
        self.extra = extra.to_vec();
        self
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--listen-address=0.0.0.0".to_string(),
            "--rest=true".to_string(),
            "--rest-admin=true".to_string(),
            "--rest-address=0.0.0.0".to_string(),
            format!("--rest-port={}", self.rest_port),
            "--metrics-server=true".to_string(),
            "--metrics-server-address=0.0.0.0".to_string(),
            format!("--metrics-server-port={}", self.metrics_port),
        ];
        args.extend(self.static_nodes.iter().map(|addr| format!("--staticnode={addr}")));
        args.extend(self.extra.iter().cloned());
        args
    }
}

/// Container name of the `index`-th node of a role.
pub fn node_name(role: NodeRole, index: usize) -> String {
    match role {
        NodeRole::Bootstrap => format!("bootstrap-node-{index}"),
        NodeRole::Regular => format!("node-{index}"),
    }
}
