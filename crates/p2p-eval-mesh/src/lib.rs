//! p2p-eval-mesh: a one-shot mesh of containerized nodes.
//!
//! Starts `bootstrappers` bootstrap nodes, discovers their multi-addresses
//! through the control plane, then starts the remaining nodes with those
//! addresses as static peers. Everything lives on one dedicated container
//! network and is torn down together.
//!
//! # Architecture
//!
//! ```text
//! Mesh<E: ContainerEngine>
//!   ├── start()
//!   │   ├── pull image, recreate network
//!   │   ├── allocate 2 × num_nodes host ports up front
//!   │   ├── bootstrap nodes   (concurrent)
//!   │   ├── resolve addrs     (concurrent, RpcClient::try_info + retry)
//!   │   └── regular nodes     (concurrent, --staticnode=<addr>...)
//!   ├── stop()                (concurrent stop+remove, then network; never fails)
//!   └── run(body)             (start → body → stop on every exit path)
//!
//! ContainerEngine
//!   └── DockerCli             (docker CLI via tokio::process)
//! ```

pub mod docker;
pub mod engine;
pub mod error;
pub mod mesh;
pub mod node;
pub mod ports;

pub use docker::DockerCli;
pub use engine::{ContainerEngine, ContainerHandle, ContainerSpec};
pub use error::{EngineError, EngineResult, MeshError, MeshResult, ResolveError};
pub use mesh::{Mesh, MeshSettings};
pub use node::{MeshNode, NodeArgs};
pub use ports::allocate_ports;
